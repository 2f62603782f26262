use serde::{ser::SerializeMap, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Change<T> {
    New(T),
    Updated(T),
}

impl<T> Change<T> {
    pub fn as_new(&self) -> Option<&T> {
        match self {
            Change::New(state) => Some(state),
            Change::Updated(_) => None,
        }
    }

    pub fn as_updated(&self) -> Option<&T> {
        match self {
            Change::New(_) => None,
            Change::Updated(state) => Some(state),
        }
    }
}

/// Result of one `ensure` call.
///
/// `result` is `None` for a dry run that would have changed something,
/// `Some(false)` when the provider rejected a call. `changes` is empty
/// unless a mutation actually happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound(serialize = "T: Serialize"))]
pub struct Outcome<T> {
    pub name: String,
    pub result: Option<bool>,
    pub comment: String,
    #[serde(serialize_with = "serialize_changes")]
    pub changes: Option<Change<T>>,
}

impl<T> Outcome<T> {
    pub fn unchanged(name: impl Into<String>) -> Self {
        let name = name.into();
        Outcome {
            comment: format!("{name} exists"),
            name,
            result: Some(true),
            changes: None,
        }
    }

    pub fn pending(name: impl Into<String>, kind: &str) -> Self {
        let name = name.into();
        Outcome {
            comment: format!("{kind} {name} set to be created or updated"),
            name,
            result: None,
            changes: None,
        }
    }

    pub fn changed(name: impl Into<String>, kind: &str, change: Change<T>) -> Self {
        let name = name.into();
        let verb = match change {
            Change::New(_) => "created",
            Change::Updated(_) => "updated",
        };
        Outcome {
            comment: format!("{kind} {name} {verb}"),
            name,
            result: Some(true),
            changes: Some(change),
        }
    }

    pub fn failed(name: impl Into<String>, comment: impl Into<String>) -> Self {
        Outcome {
            name: name.into(),
            result: Some(false),
            comment: comment.into(),
            changes: None,
        }
    }

    pub fn is_failure(&self) -> bool {
        self.result == Some(false)
    }

    pub fn new_state(&self) -> Option<&T> {
        self.changes.as_ref().and_then(Change::as_new)
    }

    pub fn updated_state(&self) -> Option<&T> {
        self.changes.as_ref().and_then(Change::as_updated)
    }
}

fn serialize_changes<S, T>(changes: &Option<Change<T>>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize,
{
    match changes {
        Some(change) => change.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn unchanged_renders_empty_changes() {
        let outcome: Outcome<u32> = Outcome::unchanged("example.com");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({
                "name": "example.com",
                "result": true,
                "comment": "example.com exists",
                "changes": {}
            })
        );
    }

    #[test]
    fn dry_run_renders_null_result() {
        let outcome: Outcome<u32> = Outcome::pending("example.com", "DNS zone");
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["result"], serde_json::Value::Null);
        assert_eq!(
            value["comment"],
            "DNS zone example.com set to be created or updated"
        );
    }

    #[test]
    fn change_renders_under_its_key() {
        let outcome = Outcome::changed("example.com", "DNS zone", Change::Updated(900));
        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["changes"], json!({ "updated": 900 }));
        assert_eq!(outcome.updated_state(), Some(&900));
        assert_eq!(outcome.new_state(), None);
    }
}
