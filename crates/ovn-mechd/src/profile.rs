//! Binding-profile parsing.
//!
//! A port's binding profile is a free-form map. The driver understands two
//! parameter sets and treats everything else as a plain port:
//!
//! | variant        | keys                                          |
//! |----------------|-----------------------------------------------|
//! | sub-interface  | `parent_name` (string), `tag` (int, 0..=4095) |
//! | VTEP gateway   | `vtep-physical-switch`, `vtep-logical-switch` |
//!
//! A profile that names any key of a set must carry the whole set and
//! nothing else.

use std::collections::BTreeMap;

use ovn_types::VlanTag;
use serde_json::Value;

use crate::error::{DriverError, DriverResult};

pub const PARENT_NAME: &str = "parent_name";
pub const TAG: &str = "tag";
pub const VTEP_PHYSICAL_SWITCH: &str = "vtep-physical-switch";
pub const VTEP_LOGICAL_SWITCH: &str = "vtep-logical-switch";

const FIELD: &str = "binding:profile";

/// Expected JSON type of a profile parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParamType {
    String,
    Integer,
}

impl ParamType {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
        }
    }
}

/// Known parameter sets, in the order they are probed.
const PARAM_SETS: [&[(&str, ParamType)]; 2] = [
    &[(PARENT_NAME, ParamType::String), (TAG, ParamType::Integer)],
    &[
        (VTEP_PHYSICAL_SWITCH, ParamType::String),
        (VTEP_LOGICAL_SWITCH, ParamType::String),
    ],
];

/// A validated binding profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingProfile {
    /// No recognised parameter set.
    Plain,
    /// A container port nested in `parent_name`, tagged with `tag`.
    SubInterface { parent_name: String, tag: VlanTag },
    /// A port bound to a hardware VTEP gateway.
    VtepGateway {
        physical_switch: String,
        logical_switch: String,
    },
}

impl BindingProfile {
    /// Validates `profile` and selects its variant.
    ///
    /// Does not check that `parent_name` refers to an existing port; the
    /// driver does that separately.
    pub fn parse(profile: &BTreeMap<String, Value>) -> DriverResult<Self> {
        for set in PARAM_SETS {
            let present: Vec<(&str, ParamType, &Value)> = set
                .iter()
                .filter_map(|(key, ty)| profile.get(*key).map(|v| (*key, *ty, v)))
                .collect();
            if present.is_empty() {
                continue;
            }
            if present.len() != set.len() {
                let keys: Vec<&str> = set.iter().map(|(k, _)| *k).collect();
                return Err(invalid(format!("{} are all required.", keys.join(", "))));
            }
            if profile.len() != set.len() {
                return Err(invalid("too many parameters".to_string()));
            }
            for (key, ty, value) in &present {
                if !ty.matches(value) {
                    return Err(invalid(format!("{key} {} value invalid type", display(value))));
                }
            }
            return Self::from_params(profile);
        }
        Ok(BindingProfile::Plain)
    }

    fn from_params(profile: &BTreeMap<String, Value>) -> DriverResult<Self> {
        let string = |key: &str| {
            profile
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default()
        };

        if profile.contains_key(PARENT_NAME) {
            let raw = profile.get(TAG).unwrap_or(&Value::Null);
            let tag = raw
                .as_i64()
                .and_then(|v| VlanTag::new(v).ok())
                .ok_or_else(|| {
                    invalid(format!(
                        "tag \"{raw}\" must be an integer between 0 and 4095, inclusive"
                    ))
                })?;
            Ok(BindingProfile::SubInterface {
                parent_name: string(PARENT_NAME),
                tag,
            })
        } else {
            Ok(BindingProfile::VtepGateway {
                physical_switch: string(VTEP_PHYSICAL_SWITCH),
                logical_switch: string(VTEP_LOGICAL_SWITCH),
            })
        }
    }

    /// Parent port that must exist, for sub-interfaces.
    pub fn parent_name(&self) -> Option<&str> {
        match self {
            BindingProfile::SubInterface { parent_name, .. } => Some(parent_name),
            _ => None,
        }
    }
}

fn invalid(reason: String) -> DriverError {
    DriverError::invalid_input(FIELD, format!("Invalid binding:profile. {reason}"))
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn profile(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    fn reason(err: DriverError) -> String {
        match err {
            DriverError::InvalidInput { message, .. } => message,
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_plain_profiles() {
        assert_eq!(BindingProfile::parse(&BTreeMap::new()).unwrap(), BindingProfile::Plain);
        assert_eq!(
            BindingProfile::parse(&profile(json!({"capabilities": ["switchdev"]}))).unwrap(),
            BindingProfile::Plain
        );
    }

    #[test]
    fn test_sub_interface_tag_bounds() {
        let parsed =
            BindingProfile::parse(&profile(json!({"parent_name": "p0", "tag": 4095}))).unwrap();
        assert_eq!(
            parsed,
            BindingProfile::SubInterface {
                parent_name: "p0".to_string(),
                tag: VlanTag::new(4095).unwrap(),
            }
        );
        assert_eq!(parsed.parent_name(), Some("p0"));

        let err =
            BindingProfile::parse(&profile(json!({"parent_name": "p0", "tag": 4096}))).unwrap_err();
        assert_eq!(
            reason(err),
            "Invalid binding:profile. tag \"4096\" must be an integer between 0 and 4095, inclusive"
        );

        let err =
            BindingProfile::parse(&profile(json!({"parent_name": "p0", "tag": -1}))).unwrap_err();
        assert!(reason(err).contains("between 0 and 4095"));

        let err = BindingProfile::parse(&profile(json!({"parent_name": "p0", "tag": u64::MAX})))
            .unwrap_err();
        assert_eq!(
            reason(err),
            "Invalid binding:profile. tag \"18446744073709551615\" must be an integer between 0 and 4095, inclusive"
        );
    }

    #[test]
    fn test_partial_set_rejected() {
        let err = BindingProfile::parse(&profile(json!({"parent_name": "p0"}))).unwrap_err();
        assert_eq!(
            reason(err),
            "Invalid binding:profile. parent_name, tag are all required."
        );

        let err =
            BindingProfile::parse(&profile(json!({"vtep-logical-switch": "ls"}))).unwrap_err();
        assert_eq!(
            reason(err),
            "Invalid binding:profile. vtep-physical-switch, vtep-logical-switch are all required."
        );
    }

    #[test]
    fn test_mixed_sets_rejected() {
        let err = BindingProfile::parse(&profile(json!({
            "parent_name": "p0",
            "tag": 10,
            "vtep-physical-switch": "psw",
        })))
        .unwrap_err();
        assert_eq!(reason(err), "Invalid binding:profile. too many parameters");
    }

    #[test]
    fn test_type_mismatch_rejected() {
        let err = BindingProfile::parse(&profile(json!({"parent_name": "p0", "tag": "10"})))
            .unwrap_err();
        assert_eq!(reason(err), "Invalid binding:profile. tag 10 value invalid type");

        let err = BindingProfile::parse(&profile(json!({"parent_name": 7, "tag": 10})))
            .unwrap_err();
        assert_eq!(
            reason(err),
            "Invalid binding:profile. parent_name 7 value invalid type"
        );

        let err = BindingProfile::parse(&profile(json!({"parent_name": "p0", "tag": 1.5})))
            .unwrap_err();
        assert!(reason(err).contains("value invalid type"));
    }

    #[test]
    fn test_vtep_gateway() {
        let parsed = BindingProfile::parse(&profile(json!({
            "vtep-physical-switch": "psw1",
            "vtep-logical-switch": "lsw1",
        })))
        .unwrap();
        assert_eq!(
            parsed,
            BindingProfile::VtepGateway {
                physical_switch: "psw1".to_string(),
                logical_switch: "lsw1".to_string(),
            }
        );
        assert_eq!(parsed.parent_name(), None);
    }
}
