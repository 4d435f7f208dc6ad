//! Configuration changes and the capability that applies them

use std::fmt;

use async_trait::async_trait;
use sonic_buffer_common::BufferModelResult;

use crate::params::StaticProfileParams;
use crate::types::{CableLength, PgRange, ProfileIdentity};

/// A configuration change issued to the device
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferConfigChange {
    SetSpeed {
        port: String,
        speed: u32,
    },
    SetMtu {
        port: String,
        mtu: u32,
    },
    SetCableLength {
        port: String,
        cable_length: CableLength,
    },
    /// Configure a lossless PG, dynamic when `profile` is `None`
    AddLosslessPg {
        port: String,
        pg: PgRange,
        profile: Option<ProfileIdentity>,
    },
    /// Change the profile of a configured lossless PG
    SetLosslessPg {
        port: String,
        pg: PgRange,
        profile: Option<ProfileIdentity>,
    },
    /// Remove one lossless PG, or all of them when `pg` is `None`
    RemoveLosslessPg {
        port: String,
        pg: Option<PgRange>,
    },
    AddProfile {
        name: ProfileIdentity,
        params: StaticProfileParams,
    },
    SetProfile {
        name: ProfileIdentity,
        params: StaticProfileParams,
    },
    RemoveProfile {
        name: ProfileIdentity,
    },
}

impl BufferConfigChange {
    /// Port the change targets, if any
    pub fn port(&self) -> Option<&str> {
        match self {
            BufferConfigChange::SetSpeed { port, .. }
            | BufferConfigChange::SetMtu { port, .. }
            | BufferConfigChange::SetCableLength { port, .. }
            | BufferConfigChange::AddLosslessPg { port, .. }
            | BufferConfigChange::SetLosslessPg { port, .. }
            | BufferConfigChange::RemoveLosslessPg { port, .. } => Some(port),
            BufferConfigChange::AddProfile { .. }
            | BufferConfigChange::SetProfile { .. }
            | BufferConfigChange::RemoveProfile { .. } => None,
        }
    }
}

fn profile_arg(profile: &Option<ProfileIdentity>) -> &str {
    profile.as_ref().map(|p| p.as_str()).unwrap_or("")
}

fn params_args(params: &StaticProfileParams) -> String {
    let mut args = String::new();
    for (flag, value) in [
        ("--xon", params.xon.map(|v| v.to_string())),
        ("--xoff", params.xoff.map(|v| v.to_string())),
        ("--size", params.size.map(|v| v.to_string())),
        ("--dynamic_th", params.dynamic_th.map(|v| v.to_string())),
    ] {
        if let Some(value) = value {
            args.push_str(&format!(" {} {}", flag, value));
        }
    }
    args
}

/// Renders the change the way the `config` CLI spells it
impl fmt::Display for BufferConfigChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferConfigChange::SetSpeed { port, speed } => {
                write!(f, "config interface speed {} {}", port, speed)
            }
            BufferConfigChange::SetMtu { port, mtu } => {
                write!(f, "config interface mtu {} {}", port, mtu)
            }
            BufferConfigChange::SetCableLength { port, cable_length } => {
                write!(f, "config interface cable-length {} {}", port, cable_length)
            }
            BufferConfigChange::AddLosslessPg { port, pg, profile } => write!(
                f,
                "config interface buffer priority-group lossless add {} {} {}",
                port,
                pg,
                profile_arg(profile)
            ),
            BufferConfigChange::SetLosslessPg { port, pg, profile } => write!(
                f,
                "config interface buffer priority-group lossless set {} {} {}",
                port,
                pg,
                profile_arg(profile)
            ),
            BufferConfigChange::RemoveLosslessPg { port, pg } => write!(
                f,
                "config interface buffer priority-group lossless remove {} {}",
                port,
                pg.map(|p| p.to_string()).unwrap_or_default()
            ),
            BufferConfigChange::AddProfile { name, params } => {
                write!(f, "config buffer profile add {}{}", name, params_args(params))
            }
            BufferConfigChange::SetProfile { name, params } => {
                write!(f, "config buffer profile set {}{}", name, params_args(params))
            }
            BufferConfigChange::RemoveProfile { name } => {
                write!(f, "config buffer profile remove {}", name)
            }
        }
    }
}

/// Issues configuration changes to a device
///
/// Fire-and-forget: success means the change was handed over, not that any
/// state layer reflects it yet.
#[async_trait]
pub trait ConfigApplier: Send {
    async fn apply(&mut self, change: &BufferConfigChange) -> BufferModelResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_cli() {
        let change = BufferConfigChange::SetCableLength {
            port: "Ethernet0".to_string(),
            cable_length: CableLength(300),
        };
        assert_eq!(
            change.to_string(),
            "config interface cable-length Ethernet0 300m"
        );

        let change = BufferConfigChange::AddProfile {
            name: ProfileIdentity::new("test-headroom"),
            params: StaticProfileParams {
                xon: Some(18432),
                xoff: Some(50000),
                size: Some(68432),
                dynamic_th: None,
            },
        };
        assert_eq!(
            change.to_string(),
            "config buffer profile add test-headroom --xon 18432 --xoff 50000 --size 68432"
        );
    }

    #[test]
    fn test_port() {
        let change = BufferConfigChange::RemoveLosslessPg {
            port: "Ethernet0".to_string(),
            pg: None,
        };
        assert_eq!(change.port(), Some("Ethernet0"));
        assert_eq!(
            BufferConfigChange::RemoveProfile {
                name: ProfileIdentity::new("x")
            }
            .port(),
            None
        );
    }
}
