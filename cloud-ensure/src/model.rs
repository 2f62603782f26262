use std::{collections::BTreeSet, fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProviderError;

pub const MINIMUM_TTL: u32 = 300;
pub const DEFAULT_ZONE_TTL: u32 = 3600;
pub const DEFAULT_RECORD_TTL: u32 = 600;
pub const MAX_DB_VOLUME_SIZE: u32 = 150;
pub const PAGE_SIZE: usize = 100;
pub const CDN_TTL_RANGE: RangeInclusive<u32> = 900..=31_536_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "String", into = "String")]
pub enum RecordType {
    A,
    AAAA,
    CNAME,
    MX,
    NS,
    PTR,
    SRV,
    TXT,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::A => "A",
            RecordType::AAAA => "AAAA",
            RecordType::CNAME => "CNAME",
            RecordType::MX => "MX",
            RecordType::NS => "NS",
            RecordType::PTR => "PTR",
            RecordType::SRV => "SRV",
            RecordType::TXT => "TXT",
        }
    }

    pub fn requires_priority(&self) -> bool {
        matches!(self, RecordType::MX | RecordType::SRV)
    }
}

impl FromStr for RecordType {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "AAAA" => Ok(RecordType::AAAA),
            "CNAME" => Ok(RecordType::CNAME),
            "MX" => Ok(RecordType::MX),
            "NS" => Ok(RecordType::NS),
            "PTR" => Ok(RecordType::PTR),
            "SRV" => Ok(RecordType::SRV),
            "TXT" => Ok(RecordType::TXT),
            _ => Err(ProviderError::invalid(format!("unknown record type {s:?}"))),
        }
    }
}

impl TryFrom<String> for RecordType {
    type Error = ProviderError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RecordType> for String {
    fn from(value: RecordType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records are identified by zone, name and type together; several records
/// may still share one key (round-robin A records).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct RecordKey {
    pub zone: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
}

impl RecordKey {
    pub fn new(
        zone: impl Into<String>,
        name: impl Into<String>,
        record_type: &str,
    ) -> Result<Self, ProviderError> {
        Ok(RecordKey {
            zone: zone.into(),
            name: name.into(),
            record_type: record_type.parse()?,
        })
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} in {}", self.record_type, self.name, self.zone)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct DatabaseKey {
    pub instance: String,
    pub name: String,
}

impl fmt::Display for DatabaseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.name, self.instance)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct UserKey {
    pub instance: String,
    pub name: String,
}

impl fmt::Display for UserKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} on {}", self.name, self.instance)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub id: String,
    pub name: String,
    pub email: String,
    pub ttl: u32,
    pub nameservers: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ZoneSettings {
    pub email: Option<String>,
    pub ttl: Option<u32>,
    pub comment: Option<String>,
}

impl ZoneSettings {
    pub fn matches(&self, zone: &Zone) -> bool {
        self.email.as_ref().map_or(true, |email| *email == zone.email)
            && self.ttl.map_or(true, |ttl| ttl == zone.ttl)
            && self
                .comment
                .as_ref()
                .map_or(true, |comment| zone.comment.as_ref() == Some(comment))
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        validate_ttl(self.ttl)?;
        if self.email.as_deref().is_some_and(str::is_empty) {
            return Err(ProviderError::invalid("email must not be empty"));
        }
        Ok(())
    }

    pub fn validate_create(&self) -> Result<(), ProviderError> {
        self.validate()?;
        if self.email.is_none() {
            return Err(ProviderError::invalid("email is required to create a zone"));
        }
        Ok(())
    }

    pub fn validate_update(&self) -> Result<(), ProviderError> {
        self.validate()?;
        if self.email.is_none() && self.ttl.is_none() && self.comment.is_none() {
            return Err(ProviderError::invalid(
                "must provide one of the following: email, ttl, comment",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub data: String,
    pub ttl: u32,
    pub priority: Option<u16>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RecordSettings {
    pub data: String,
    pub ttl: Option<u32>,
    pub priority: Option<u16>,
    pub comment: Option<String>,
}

impl RecordSettings {
    pub fn new(data: impl Into<String>) -> Self {
        RecordSettings {
            data: data.into(),
            ttl: None,
            priority: None,
            comment: None,
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.data == record.data && self.matches_attributes(record)
    }

    /// Compares everything except `data`.
    pub fn matches_attributes(&self, record: &Record) -> bool {
        self.ttl.map_or(true, |ttl| ttl == record.ttl)
            && self
                .priority
                .map_or(true, |priority| record.priority == Some(priority))
            && self
                .comment
                .as_ref()
                .map_or(true, |comment| record.comment.as_ref() == Some(comment))
    }

    pub fn validate(&self, record_type: RecordType) -> Result<(), ProviderError> {
        validate_ttl(self.ttl)?;
        if self.data.is_empty() {
            return Err(ProviderError::invalid("record data must not be empty"));
        }
        match (record_type.requires_priority(), self.priority) {
            (true, None) => Err(ProviderError::invalid(format!(
                "priority required for {record_type} records"
            ))),
            (false, Some(_)) => Err(ProviderError::invalid(format!(
                "priority is not valid for {record_type} records"
            ))),
            _ => Ok(()),
        }
    }

    pub fn create_ttl(&self) -> u32 {
        self.ttl.unwrap_or(DEFAULT_RECORD_TTL)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
    pub ram: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: String,
    pub flavor: String,
    pub volume_size: u32,
    pub hostname: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct InstanceSettings {
    pub flavor: Option<String>,
    pub volume_size: Option<u32>,
}

impl InstanceSettings {
    pub fn matches(&self, instance: &Instance) -> bool {
        self.flavor
            .as_ref()
            .map_or(true, |flavor| *flavor == instance.flavor)
            && self
                .volume_size
                .map_or(true, |size| size == instance.volume_size)
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        match self.volume_size {
            Some(size) if size == 0 || size > MAX_DB_VOLUME_SIZE => Err(ProviderError::invalid(
                format!("volume size must be between 1 and {MAX_DB_VOLUME_SIZE}"),
            )),
            _ => Ok(()),
        }
    }

    pub fn validate_create(&self) -> Result<(), ProviderError> {
        self.validate()?;
        if self.flavor.is_none() || self.volume_size.is_none() {
            return Err(ProviderError::invalid(
                "flavor and volume size are required to create an instance",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Database {
    pub name: String,
    pub character_set: Option<String>,
    pub collate: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct DatabaseSettings {
    pub character_set: Option<String>,
    pub collate: Option<String>,
}

impl DatabaseSettings {
    pub fn matches(&self, database: &Database) -> bool {
        self.character_set
            .as_ref()
            .map_or(true, |charset| database.character_set.as_ref() == Some(charset))
            && self
                .collate
                .as_ref()
                .map_or(true, |collate| database.collate.as_ref() == Some(collate))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub host: String,
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct UserSettings {
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub host: Option<String>,
    pub databases: Option<Vec<String>>,
}

impl UserSettings {
    /// The password cannot be read back from the provider and is never
    /// compared.
    pub fn matches(&self, user: &User) -> bool {
        self.host.as_ref().map_or(true, |host| *host == user.host)
            && self.databases.as_ref().map_or(true, |databases| {
                databases.iter().collect::<BTreeSet<_>>()
                    == user.databases.iter().collect::<BTreeSet<_>>()
            })
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        if self.password.as_deref().is_some_and(str::is_empty) {
            return Err(ProviderError::invalid("password must not be empty"));
        }
        Ok(())
    }

    pub fn validate_create(&self) -> Result<(), ProviderError> {
        self.validate()?;
        if self.password.is_none() {
            return Err(ProviderError::invalid("password is required to create a user"));
        }
        Ok(())
    }

    pub fn host_or_default(&self) -> String {
        self.host.clone().unwrap_or_else(|| "%".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub object_count: u64,
    pub bytes_used: u64,
    pub cdn_enabled: bool,
    pub cdn_uri: Option<String>,
    pub cdn_ttl: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct ContainerSettings {
    pub cdn_enabled: Option<bool>,
    pub cdn_ttl: Option<u32>,
}

impl ContainerSettings {
    pub fn matches(&self, container: &Container) -> bool {
        self.cdn_enabled
            .map_or(true, |enabled| enabled == container.cdn_enabled)
            && self
                .cdn_ttl
                .map_or(true, |ttl| container.cdn_ttl == Some(ttl))
    }

    pub fn validate(&self) -> Result<(), ProviderError> {
        match self.cdn_ttl {
            Some(ttl) if !CDN_TTL_RANGE.contains(&ttl) => {
                Err(ProviderError::invalid(format!(
                    "cdn ttl must be between {} and {}",
                    CDN_TTL_RANGE.start(),
                    CDN_TTL_RANGE.end()
                )))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadBalancer {
    pub id: String,
    pub name: String,
    pub port: u16,
    pub protocol: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
    pub status: String,
}

fn validate_ttl(ttl: Option<u32>) -> Result<(), ProviderError> {
    match ttl {
        Some(ttl) if ttl < MINIMUM_TTL => Err(ProviderError::invalid(format!(
            "ttl has a minimum value of {MINIMUM_TTL}"
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zone() -> Zone {
        Zone {
            id: "1".to_string(),
            name: "example.com".to_string(),
            email: "a@example.com".to_string(),
            ttl: 600,
            nameservers: vec![],
            comment: None,
        }
    }

    #[test]
    fn record_type_parses_case_insensitively() {
        assert_eq!("mx".parse::<RecordType>().unwrap(), RecordType::MX);
        assert_eq!("Aaaa".parse::<RecordType>().unwrap(), RecordType::AAAA);
        assert!(matches!(
            "SPF".parse::<RecordType>(),
            Err(ProviderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn empty_zone_settings_match_anything() {
        assert!(ZoneSettings::default().matches(&zone()));
    }

    #[test]
    fn zone_settings_compare_present_fields_only() {
        let settings = ZoneSettings {
            ttl: Some(600),
            ..Default::default()
        };
        assert!(settings.matches(&zone()));

        let settings = ZoneSettings {
            ttl: Some(900),
            ..Default::default()
        };
        assert!(!settings.matches(&zone()));

        let settings = ZoneSettings {
            comment: Some("primary".to_string()),
            ..Default::default()
        };
        assert!(!settings.matches(&zone()));
    }

    #[test]
    fn zone_ttl_below_minimum_is_rejected() {
        let settings = ZoneSettings {
            email: Some("a@example.com".to_string()),
            ttl: Some(299),
            comment: None,
        };
        assert!(matches!(
            settings.validate(),
            Err(ProviderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zone_update_needs_a_field() {
        assert!(ZoneSettings::default().validate_update().is_err());
        assert!(ZoneSettings::default().validate_create().is_err());
    }

    #[test]
    fn priority_is_required_for_mx_and_srv() {
        let settings = RecordSettings::new("mail.example.com");
        assert!(settings.validate(RecordType::MX).is_err());
        assert!(settings.validate(RecordType::SRV).is_err());
        assert!(settings.validate(RecordType::CNAME).is_ok());

        let settings = RecordSettings {
            priority: Some(10),
            ..RecordSettings::new("mail.example.com")
        };
        assert!(settings.validate(RecordType::MX).is_ok());
        assert!(settings.validate(RecordType::A).is_err());
    }

    #[test]
    fn instance_volume_is_bounded() {
        let settings = InstanceSettings {
            flavor: Some("1GB Instance".to_string()),
            volume_size: Some(MAX_DB_VOLUME_SIZE + 1),
        };
        assert!(settings.validate().is_err());

        let settings = InstanceSettings {
            volume_size: Some(MAX_DB_VOLUME_SIZE),
            ..settings
        };
        assert!(settings.validate_create().is_ok());
        assert!(InstanceSettings::default().validate_create().is_err());
    }

    #[test]
    fn user_databases_compare_as_sets() {
        let user = User {
            name: "app".to_string(),
            host: "%".to_string(),
            databases: vec!["b".to_string(), "a".to_string()],
        };
        let settings = UserSettings {
            password: Some("ignored".to_string()),
            host: None,
            databases: Some(vec!["a".to_string(), "b".to_string()]),
        };
        assert!(settings.matches(&user));
    }

    #[test]
    fn container_cdn_ttl_is_bounded() {
        let settings = ContainerSettings {
            cdn_enabled: Some(true),
            cdn_ttl: Some(60),
        };
        assert!(settings.validate().is_err());
    }
}
