//! Table and field name constants for the buffer model

// CONFIG_DB tables
pub const CFG_DEVICE_METADATA_TABLE: &str = "DEVICE_METADATA";
pub const CFG_BUFFER_POOL_TABLE: &str = "BUFFER_POOL";
pub const CFG_PORT_TABLE: &str = "PORT";

/// Key of the local device in DEVICE_METADATA
pub const DEVICE_METADATA_LOCALHOST: &str = "localhost";

/// Prefix shared by the names of ingress pools
pub const INGRESS_POOL_PREFIX: &str = "ingress";

// APPL_DB tables
pub const APP_BUFFER_PROFILE_TABLE: &str = "BUFFER_PROFILE_TABLE";
pub const APP_BUFFER_PG_TABLE: &str = "BUFFER_PG_TABLE";
pub const APP_BUFFER_POOL_TABLE: &str = "BUFFER_POOL_TABLE";
pub const APP_PORT_QOS_MAP_TABLE: &str = "PORT_QOS_MAP";

// STATE_DB tables
pub const STATE_BUFFER_PROFILE_TABLE: &str = "BUFFER_PROFILE_TABLE";
pub const STATE_BUFFER_MAX_PARAM_TABLE: &str = "BUFFER_MAX_PARAM_TABLE";

// ASIC_DB object key prefixes
pub const ASIC_STATE_TABLE: &str = "ASIC_STATE";
pub const SAI_OBJECT_TYPE_BUFFER_PROFILE: &str = "SAI_OBJECT_TYPE_BUFFER_PROFILE";
pub const SAI_OBJECT_TYPE_BUFFER_POOL: &str = "SAI_OBJECT_TYPE_BUFFER_POOL";

/// DEVICE_METADATA table fields
pub mod device_metadata_fields {
    pub const BUFFER_MODEL: &str = "buffer_model";

    pub const BUFFER_MODEL_DYNAMIC: &str = "dynamic";
}

/// PORT table fields
pub mod port_fields {
    pub const MTU: &str = "mtu";
}

/// PORT_QOS_MAP table fields
pub mod qos_map_fields {
    pub const PFC_ENABLE: &str = "pfc_enable";
}

/// BUFFER_PROFILE table fields
pub mod buffer_profile_fields {
    pub const POOL: &str = "pool";
    pub const XON: &str = "xon";
    pub const XOFF: &str = "xoff";
    pub const SIZE: &str = "size";
    pub const DYNAMIC_TH: &str = "dynamic_th";
    pub const STATIC_TH: &str = "static_th";
}

/// BUFFER_PG table fields
pub mod buffer_pg_fields {
    pub const PROFILE: &str = "profile";
}

/// BUFFER_POOL table fields
pub mod buffer_pool_fields {
    pub const SIZE: &str = "size";
}

/// BUFFER_MAX_PARAM table fields
pub mod max_param_fields {
    pub const MAX_HEADROOM_SIZE: &str = "max_headroom_size";
}

/// SAI buffer profile attributes
pub mod sai_profile_attrs {
    pub const XON_TH: &str = "SAI_BUFFER_PROFILE_ATTR_XON_TH";
    pub const XOFF_TH: &str = "SAI_BUFFER_PROFILE_ATTR_XOFF_TH";
    pub const RESERVED_BUFFER_SIZE: &str = "SAI_BUFFER_PROFILE_ATTR_RESERVED_BUFFER_SIZE";
    pub const POOL_ID: &str = "SAI_BUFFER_PROFILE_ATTR_POOL_ID";
    pub const THRESHOLD_MODE: &str = "SAI_BUFFER_PROFILE_ATTR_THRESHOLD_MODE";
    pub const SHARED_DYNAMIC_TH: &str = "SAI_BUFFER_PROFILE_ATTR_SHARED_DYNAMIC_TH";

    pub const THRESHOLD_MODE_DYNAMIC: &str = "SAI_BUFFER_PROFILE_THRESHOLD_MODE_DYNAMIC";
    pub const THRESHOLD_MODE_STATIC: &str = "SAI_BUFFER_PROFILE_THRESHOLD_MODE_STATIC";
}

/// SAI buffer pool attributes
pub mod sai_pool_attrs {
    pub const SIZE: &str = "SAI_BUFFER_POOL_ATTR_SIZE";
}

/// Prefix of hardware buffer profile object keys
pub fn asic_profile_prefix() -> String {
    format!("{}:{}", ASIC_STATE_TABLE, SAI_OBJECT_TYPE_BUFFER_PROFILE)
}

/// Hardware key of a buffer pool object
pub fn asic_pool_key(pool_oid: &str) -> String {
    format!("{}:{}:{}", ASIC_STATE_TABLE, SAI_OBJECT_TYPE_BUFFER_POOL, pool_oid)
}
