//! The fleet schema.

use super::descriptor::{fk, JoinSpec, TableDescriptor};

/// Descriptors of every table the orchestrator tracks.
pub const STANDARD_TABLES: &[TableDescriptor] = &[
    TableDescriptor::new("address")
        .indexes(&["network", "vnic"])
        .fkeys(&[fk("network"), fk("vnic")]),
    TableDescriptor::new("bond")
        .indexes(&["host"])
        .children(&["nic", "nic_role"])
        .fkeys(&[fk("host")]),
    TableDescriptor::new("cluster")
        .indexes(&["tenant"])
        .children(&["cluster_instance"])
        .fkeys(&[fk("tenant")]),
    TableDescriptor::new("cluster_instance")
        .indexes(&["cluster", "instance"])
        .fkeys(&[fk("cluster"), fk("instance")]),
    TableDescriptor::new("config").pkey("key"),
    TableDescriptor::new("cpu_profile")
        .joins(&[JoinSpec::new("host_cpu_profile", "cpu_profile", "host")]),
    TableDescriptor::new("disk")
        .pkey("id")
        .indexes(&["storage_pool"])
        .joins(&[JoinSpec::new("host_disk", "disk", "host")])
        .fkeys(&[fk("storage_pool")]),
    TableDescriptor::new("event")
        .pkey("hash")
        .indexes(&["host", "instance"])
        .fkeys(&[fk("host"), fk("instance")]),
    TableDescriptor::new("extent")
        .indexes(&["volume", "storage_pool"])
        .fkeys(&[fk("volume"), fk("storage_pool")]),
    TableDescriptor::new("host")
        .joins(&[
            JoinSpec::new("host_disk", "host", "disk"),
            JoinSpec::new("host_instance", "host", "instance"),
        ])
        .children(&["nic", "bond"]),
    TableDescriptor::new("host_cpu_profile")
        .composite_pkey(&["host", "cpu_profile"])
        .indexes(&["host", "cpu_profile"])
        .fkeys(&[fk("host"), fk("cpu_profile")])
        .virtual_table(),
    TableDescriptor::new("host_disk")
        .composite_pkey(&["host", "disk"])
        .indexes(&["host", "disk"])
        .fkeys(&[fk("host"), fk("disk")])
        .virtual_table(),
    TableDescriptor::new("host_instance")
        .composite_pkey(&["host", "instance"])
        .indexes(&["host", "instance"])
        .fkeys(&[fk("host"), fk("instance")])
        .virtual_table(),
    TableDescriptor::new("host_volume")
        .composite_pkey(&["host", "volume"])
        .indexes(&["host", "volume", "type"])
        .fkeys(&[fk("host"), fk("volume")])
        .virtual_table(),
    TableDescriptor::new("image")
        .indexes(&["tenant"])
        .joins(&[JoinSpec::new("tenant_image", "image", "tenant")])
        .fkeys(&[fk("tenant")]),
    TableDescriptor::new("instance")
        .indexes(&["cpu_profile", "tenant"])
        .joins(&[JoinSpec::new("host_instance", "instance", "host")])
        .children(&["vdisk", "cluster_instance", "vnic"])
        .fkeys(&[fk("cpu_profile"), fk("tenant")]),
    TableDescriptor::new("member")
        .indexes(&["tenant", "user"])
        .fkeys(&[fk("tenant"), fk("user")]),
    TableDescriptor::new("network")
        .indexes(&["switch"])
        .children(&["route"])
        .fkeys(&[fk("switch")]),
    TableDescriptor::new("nic")
        .pkey("hwaddr")
        .indexes(&["host", "bond"])
        .fkeys(&[fk("host"), fk("bond")]),
    TableDescriptor::new("nic_role")
        .indexes(&["bond", "address"])
        .fkeys(&[fk("bond"), fk("address")]),
    TableDescriptor::new("quota")
        .indexes(&["tenant"])
        .fkeys(&[fk("tenant")]),
    TableDescriptor::new("route")
        .indexes(&["network"])
        .fkeys(&[fk("network")]),
    TableDescriptor::new("storage_pool").children(&["disk"]),
    TableDescriptor::new("switch")
        .indexes(&["tenant"])
        .joins(&[JoinSpec::new("tenant_switch", "switch", "tenant")])
        .children(&["network"])
        .fkeys(&[fk("tenant")]),
    TableDescriptor::new("tenant")
        .joins(&[JoinSpec::new("tenant_switch", "tenant", "switch")])
        .children(&[
            "instance", "image", "quota", "volume", "cluster", "switch", "member",
        ]),
    TableDescriptor::new("tenant_image")
        .composite_pkey(&["tenant", "image"])
        .indexes(&["tenant", "image"])
        .fkeys(&[fk("tenant"), fk("image")]),
    TableDescriptor::new("tenant_switch")
        .composite_pkey(&["tenant", "switch"])
        .indexes(&["tenant", "switch"])
        .fkeys(&[fk("tenant"), fk("switch")]),
    TableDescriptor::new("user").pkey("email").children(&["member"]),
    TableDescriptor::new("vdisk")
        .indexes(&["instance", "volume"])
        .fkeys(&[fk("instance"), fk("volume")]),
    TableDescriptor::new("vnic")
        .indexes(&["instance", "switch"])
        .children(&["address"])
        .fkeys(&[fk("instance"), fk("switch")]),
    TableDescriptor::new("volume")
        .indexes(&["tenant", "storage_pool"])
        .joins(&[JoinSpec::new("host_volume", "volume", "host")])
        .children(&["vdisk", "extent"])
        .fkeys(&[fk("tenant"), fk("storage_pool")]),
];
