use crate::syntax::Platform;
use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

/// Capability a work unit declares before it may run on a hosting node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Unknown/any role: metadata-only units that make no claim beyond "may run".
    Any,
    /// Units that return file contents.
    ReadData,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Any => f.write_str("any"),
            Role::ReadData => f.write_str("read_data"),
        }
    }
}

/// A self-contained piece of work shipped to the node that hosts a filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "unit", rename_all = "snake_case")]
pub enum WorkUnit {
    Canonicalize { path: PathBuf },
    ListDir { path: PathBuf },
    Stat { path: PathBuf },
    ReadFile { path: PathBuf },
}

impl WorkUnit {
    pub const ALL_NAMES: [&'static str; 4] = ["canonicalize", "list_dir", "read_file", "stat"];

    pub fn name(&self) -> &'static str {
        match self {
            WorkUnit::Canonicalize { .. } => "canonicalize",
            WorkUnit::ListDir { .. } => "list_dir",
            WorkUnit::Stat { .. } => "stat",
            WorkUnit::ReadFile { .. } => "read_file",
        }
    }

    pub fn role(&self) -> Role {
        match self {
            WorkUnit::Canonicalize { .. } | WorkUnit::ListDir { .. } | WorkUnit::Stat { .. } => Role::Any,
            WorkUnit::ReadFile { .. } => Role::ReadData,
        }
    }

    /// Role declared by the unit called `name`; `None` for names this node does not know.
    pub fn role_of(name: &str) -> Option<Role> {
        match name {
            "canonicalize" | "list_dir" | "stat" => Some(Role::Any),
            "read_file" => Some(Role::ReadData),
            _ => None,
        }
    }
}

/// Real path of a location as seen by its hosting node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub path: String,
    /// False when the path was produced by the lexical fallback.
    pub exists: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntryInfo {
    pub name: String,
    pub is_dir: bool,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatInfo {
    pub exists: bool,
    pub is_dir: bool,
    pub is_symlink: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkOutput {
    Canonical(Resolution),
    Entries { entries: Vec<DirEntryInfo> },
    Stat(StatInfo),
    Content { content_b64: String },
}

impl WorkOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkOutput::Canonical(_) => "canonical",
            WorkOutput::Entries { .. } => "entries",
            WorkOutput::Stat(_) => "stat",
            WorkOutput::Content { .. } => "content",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallRequest {
    pub id: String,
    pub unit: WorkUnit,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CallResponse {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<WorkOutput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObj>,
}

/// Anything the agent may answer with: a per-call response, or a bare error when
/// the request was refused before a unit was looked at.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    Call(CallResponse),
    Bare(ErrorObj),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorObj {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Capabilities {
    pub protocol_version: String,
    pub node: String,
    /// Path convention of the filesystem this agent serves.
    pub platform: Platform,
    pub units: Vec<UnitInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UnitInfo {
    pub name: String,
    pub role: Role,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unit_wire_shape() {
        let unit = WorkUnit::Canonicalize { path: PathBuf::from("/srv/root/a") };
        let v = serde_json::to_value(&unit).unwrap();
        assert_eq!(v, json!({"unit": "canonicalize", "path": "/srv/root/a"}));
    }

    #[test]
    fn metadata_units_declare_any_role() {
        let p = PathBuf::from("/x");
        assert_eq!(WorkUnit::Canonicalize { path: p.clone() }.role(), Role::Any);
        assert_eq!(WorkUnit::ListDir { path: p.clone() }.role(), Role::Any);
        assert_eq!(WorkUnit::Stat { path: p.clone() }.role(), Role::Any);
        assert_eq!(WorkUnit::ReadFile { path: p }.role(), Role::ReadData);
    }

    #[test]
    fn every_named_unit_has_a_role() {
        for name in WorkUnit::ALL_NAMES {
            assert!(WorkUnit::role_of(name).is_some(), "{name}");
        }
        assert_eq!(WorkUnit::role_of("read_file"), Some(Role::ReadData));
        assert_eq!(WorkUnit::role_of("write_file"), None);
    }

    #[test]
    fn capabilities_carry_platform() {
        let caps: Capabilities = serde_json::from_value(json!({
            "protocol_version": "1.0",
            "node": "ci-agent",
            "platform": "windows",
            "units": [{"name": "stat", "role": "any"}]
        }))
        .unwrap();
        assert_eq!(caps.platform, Platform::Windows);
    }

    #[test]
    fn bare_error_reply_parses() {
        let r: Reply = serde_json::from_value(json!({"code": "Unauthorized", "message": "unauthorized"})).unwrap();
        assert!(matches!(r, Reply::Bare(e) if e.code == "Unauthorized"));
        let r: Reply = serde_json::from_value(json!({
            "id": "1",
            "result": {"kind": "stat", "exists": true, "is_dir": false, "is_symlink": false}
        }))
        .unwrap();
        assert!(matches!(r, Reply::Call(CallResponse { result: Some(WorkOutput::Stat(_)), .. })));
    }
}
