use std::path::Path;

use anyhow::{Context, Error};
use serde::{Deserialize, Serialize};

use cloud_ensure::accessor::{
    ContainerAccessor, DatabaseAccessor, InstanceAccessor, RecordAccessor, UserAccessor,
    ZoneAccessor,
};
use cloud_ensure::model::{
    ContainerSettings, DatabaseKey, DatabaseSettings, InstanceSettings, RecordKey,
    RecordSettings, UserKey, UserSettings, ZoneSettings,
};
use cloud_ensure::{Change, Coordinator, Outcome};

/// One desired resource of a state file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entry {
    Zone(ZoneEntry),
    Record(RecordEntry),
    Instance(InstanceEntry),
    Database(DatabaseEntry),
    User(UserEntry),
    Container(ContainerEntry),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ZoneEntry {
    pub name: String,
    #[serde(flatten)]
    pub settings: ZoneSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordEntry {
    #[serde(flatten)]
    pub key: RecordKey,
    #[serde(flatten)]
    pub settings: RecordSettings,
    #[serde(default)]
    pub allow_multiple: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InstanceEntry {
    pub name: String,
    #[serde(flatten)]
    pub settings: InstanceSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatabaseEntry {
    #[serde(flatten)]
    pub key: DatabaseKey,
    #[serde(flatten)]
    pub settings: DatabaseSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserEntry {
    #[serde(flatten)]
    pub key: UserKey,
    #[serde(flatten)]
    pub settings: UserSettings,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContainerEntry {
    pub name: String,
    #[serde(flatten)]
    pub settings: ContainerSettings,
}

/// Outcome of one entry, with the resource state erased to JSON.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub kind: &'static str,
    #[serde(flatten)]
    pub outcome: Outcome<serde_json::Value>,
}

impl Report {
    fn new<T: Serialize>(kind: &'static str, outcome: Outcome<T>) -> Result<Self, Error> {
        let Outcome {
            name,
            result,
            comment,
            changes,
        } = outcome;
        let changes = match changes {
            Some(Change::New(state)) => Some(Change::New(serde_json::to_value(state)?)),
            Some(Change::Updated(state)) => Some(Change::Updated(serde_json::to_value(state)?)),
            None => None,
        };
        Ok(Report {
            kind,
            outcome: Outcome {
                name,
                result,
                comment,
                changes,
            },
        })
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }
}

pub fn parse(yaml: &str) -> Result<Vec<Entry>, Error> {
    let entries = serde_yaml::from_str(yaml)?;
    Ok(entries)
}

pub fn load(path: &Path) -> Result<Vec<Entry>, Error> {
    let yaml = std::fs::read_to_string(path)
        .with_context(|| format!("Unable to read {}", path.display()))?;
    parse(&yaml).with_context(|| format!("Unable to parse {}", path.display()))
}

impl Entry {
    pub fn kind(&self) -> &'static str {
        match self {
            Entry::Zone(_) => "zone",
            Entry::Record(_) => "record",
            Entry::Instance(_) => "instance",
            Entry::Database(_) => "database",
            Entry::User(_) => "user",
            Entry::Container(_) => "container",
        }
    }

    /// Runs the matching `ensure_*`. An `Err` means the entry was rejected
    /// before the provider was contacted.
    pub async fn apply<P>(&self, coordinator: &Coordinator<P>) -> Result<Report, Error>
    where
        P: ZoneAccessor
            + RecordAccessor
            + InstanceAccessor
            + DatabaseAccessor
            + UserAccessor
            + ContainerAccessor,
    {
        let kind = self.kind();
        match self {
            Entry::Zone(entry) => {
                let outcome = coordinator.ensure_zone(&entry.name, &entry.settings).await?;
                Report::new(kind, outcome)
            }
            Entry::Record(entry) => {
                let outcome = coordinator
                    .ensure_record(&entry.key, &entry.settings, entry.allow_multiple)
                    .await?;
                Report::new(kind, outcome)
            }
            Entry::Instance(entry) => {
                let outcome = coordinator
                    .ensure_instance(&entry.name, &entry.settings)
                    .await?;
                Report::new(kind, outcome)
            }
            Entry::Database(entry) => {
                let outcome = coordinator
                    .ensure_database(&entry.key, &entry.settings)
                    .await?;
                Report::new(kind, outcome)
            }
            Entry::User(entry) => {
                let outcome = coordinator.ensure_user(&entry.key, &entry.settings).await?;
                Report::new(kind, outcome)
            }
            Entry::Container(entry) => {
                let outcome = coordinator
                    .ensure_container(&entry.name, &entry.settings)
                    .await?;
                Report::new(kind, outcome)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use cloud_ensure::memory::MemoryProvider;
    use cloud_ensure::model::RecordType;

    use super::*;

    const STATE: &str = r#"
- kind: zone
  name: example.com
  email: admin@example.com
  ttl: 600
- kind: record
  zone: example.com
  name: www.example.com
  type: a
  data: 192.0.2.10
- kind: record
  zone: example.com
  name: example.com
  type: MX
  data: mail.example.com
  priority: 10
  allow_multiple: true
- kind: instance
  name: db1
  flavor: 1GB Instance
  volume_size: 10
- kind: database
  instance: db1
  name: app
- kind: user
  instance: db1
  name: app
  password: secret
  databases: [app]
- kind: container
  name: assets
  cdn_enabled: true
"#;

    #[test]
    fn parses_every_kind() {
        let entries = parse(STATE).unwrap();
        let kinds: Vec<_> = entries.iter().map(Entry::kind).collect();
        assert_eq!(
            kinds,
            vec!["zone", "record", "record", "instance", "database", "user", "container"]
        );

        let Entry::Zone(zone) = &entries[0] else {
            panic!("expected a zone");
        };
        assert_eq!(zone.settings.email.as_deref(), Some("admin@example.com"));
        assert_eq!(zone.settings.ttl, Some(600));

        let Entry::Record(record) = &entries[1] else {
            panic!("expected a record");
        };
        assert_eq!(record.key.record_type, RecordType::A);
        assert_eq!(record.settings.ttl, None);
        assert!(!record.allow_multiple);

        let Entry::Record(mx) = &entries[2] else {
            panic!("expected a record");
        };
        assert_eq!(mx.settings.priority, Some(10));
        assert!(mx.allow_multiple);

        let Entry::User(user) = &entries[5] else {
            panic!("expected a user");
        };
        assert_eq!(user.key.instance, "db1");
        assert_eq!(user.settings.databases, Some(vec!["app".to_string()]));
    }

    #[test]
    fn unknown_record_type_is_rejected() {
        let yaml = r#"
- kind: record
  zone: example.com
  name: x.example.com
  type: SPF
  data: v=spf1
"#;
        assert!(parse(yaml).is_err());
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(parse("- kind: server\n  name: web1\n").is_err());
    }

    #[tokio::test]
    async fn applying_twice_changes_nothing_the_second_time() {
        let entries = parse(STATE).unwrap();
        let provider = Arc::new(MemoryProvider::new());
        let coordinator = Coordinator::new(provider.clone(), false);

        for entry in &entries {
            let report = entry.apply(&coordinator).await.unwrap();
            assert_eq!(report.outcome.result, Some(true), "{}", report.outcome.comment);
            assert!(report.outcome.changes.is_some());
        }

        provider.clear_mutations().await;
        for entry in &entries {
            let report = entry.apply(&coordinator).await.unwrap();
            assert_eq!(report.outcome.result, Some(true));
            assert!(report.outcome.changes.is_none(), "{}", report.outcome.comment);
        }
        assert!(provider.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn dry_run_reports_pending() {
        let entries = parse(STATE).unwrap();
        let provider = Arc::new(MemoryProvider::new());
        let coordinator = Coordinator::new(provider.clone(), true);

        let report = entries[0].apply(&coordinator).await.unwrap();
        assert_eq!(report.outcome.result, None);
        assert!(provider.mutations().await.is_empty());
    }

    #[tokio::test]
    async fn report_keeps_new_state_as_json() {
        let entries = parse(STATE).unwrap();
        let coordinator = Coordinator::new(Arc::new(MemoryProvider::new()), false);

        let report = entries[0].apply(&coordinator).await.unwrap();
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["kind"], "zone");
        assert_eq!(value["name"], "example.com");
        assert_eq!(value["changes"]["new"]["ttl"], 600);
    }

    #[tokio::test]
    async fn invalid_entry_is_rejected() {
        let yaml = "- kind: zone\n  name: example.com\n  email: admin@example.com\n  ttl: 60\n";
        let entries = parse(yaml).unwrap();
        let coordinator = Coordinator::new(Arc::new(MemoryProvider::new()), false);
        assert!(entries[0].apply(&coordinator).await.is_err());
    }
}
