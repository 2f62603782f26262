//! Per-resource-type access to the provider. Accessors only translate
//! between keys, settings and the provider's calls; deciding whether to
//! create or update belongs to the coordinator.

use futures::Stream;

use crate::error::{OptionalExt, ProviderError};
use crate::model::{
    Container, ContainerSettings, Database, DatabaseKey, DatabaseSettings, Flavor, Image, Instance,
    InstanceSettings, LoadBalancer, Record, RecordKey, RecordSettings, User, UserKey,
    UserSettings, Zone, ZoneSettings,
};
use crate::pagination::{paginate, Page};

#[cfg(test)]
use mockall::automock;

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait ZoneAccessor {
    async fn list_zones_page(&self, cursor: Option<String>) -> Result<Page<Zone>, ProviderError>;
    async fn find_zone(&self, name: &str) -> Result<Zone, ProviderError>;
    async fn create_zone(&self, name: &str, settings: &ZoneSettings)
        -> Result<Zone, ProviderError>;
    async fn update_zone(&self, name: &str, settings: &ZoneSettings)
        -> Result<Zone, ProviderError>;
    async fn delete_zone(&self, name: &str) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait RecordAccessor {
    async fn list_records_page(
        &self,
        zone: &str,
        cursor: Option<String>,
    ) -> Result<Page<Record>, ProviderError>;
    /// Every record sharing the key. Fails with `NotFound` when the zone is
    /// missing; an empty list means the zone has no such record.
    async fn find_records(&self, key: &RecordKey) -> Result<Vec<Record>, ProviderError>;
    async fn create_record(
        &self,
        key: &RecordKey,
        settings: &RecordSettings,
    ) -> Result<Record, ProviderError>;
    async fn update_record(
        &self,
        zone: &str,
        id: &str,
        settings: &RecordSettings,
    ) -> Result<Record, ProviderError>;
    async fn delete_record(&self, zone: &str, id: &str) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait InstanceAccessor {
    async fn list_flavors(&self) -> Result<Vec<Flavor>, ProviderError>;
    async fn list_instances_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Instance>, ProviderError>;
    async fn find_instance(&self, name: &str) -> Result<Instance, ProviderError>;
    async fn create_instance(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<Instance, ProviderError>;
    async fn update_instance(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<Instance, ProviderError>;
    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait DatabaseAccessor {
    async fn list_databases_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<Database>, ProviderError>;
    async fn find_database(&self, key: &DatabaseKey) -> Result<Database, ProviderError>;
    async fn create_database(
        &self,
        key: &DatabaseKey,
        settings: &DatabaseSettings,
    ) -> Result<Database, ProviderError>;
    async fn update_database(
        &self,
        key: &DatabaseKey,
        settings: &DatabaseSettings,
    ) -> Result<Database, ProviderError>;
    async fn delete_database(&self, key: &DatabaseKey) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait UserAccessor {
    async fn list_users_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<User>, ProviderError>;
    async fn find_user(&self, key: &UserKey) -> Result<User, ProviderError>;
    async fn create_user(&self, key: &UserKey, settings: &UserSettings)
        -> Result<User, ProviderError>;
    async fn update_user(&self, key: &UserKey, settings: &UserSettings)
        -> Result<User, ProviderError>;
    async fn delete_user(&self, key: &UserKey) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait ContainerAccessor {
    async fn list_containers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Container>, ProviderError>;
    async fn find_container(&self, name: &str) -> Result<Container, ProviderError>;
    async fn create_container(
        &self,
        name: &str,
        settings: &ContainerSettings,
    ) -> Result<Container, ProviderError>;
    async fn update_container(
        &self,
        name: &str,
        settings: &ContainerSettings,
    ) -> Result<Container, ProviderError>;
    async fn delete_container(&self, name: &str) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait LoadBalancerAccessor {
    async fn list_load_balancers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancer>, ProviderError>;
    async fn find_load_balancer(&self, name: &str) -> Result<LoadBalancer, ProviderError>;
    async fn delete_load_balancer(&self, name: &str) -> Result<(), ProviderError>;
}

#[trait_variant::make(Send)]
#[cfg_attr(test, automock)]
pub trait ImageAccessor {
    async fn list_images_page(&self, cursor: Option<String>)
        -> Result<Page<Image>, ProviderError>;
    async fn find_image(&self, name: &str) -> Result<Image, ProviderError>;
}

pub fn zones<P: ZoneAccessor>(
    provider: &P,
) -> impl Stream<Item = Result<Zone, ProviderError>> + '_ {
    paginate(move |cursor| provider.list_zones_page(cursor))
}

pub async fn zone_exists<P: ZoneAccessor>(
    provider: &P,
    name: &str,
    filter: &ZoneSettings,
) -> Result<bool, ProviderError> {
    let zone = provider.find_zone(name).await.optional()?;
    Ok(zone.is_some_and(|zone| filter.matches(&zone)))
}

pub fn records<'a, P: RecordAccessor>(
    provider: &'a P,
    zone: &'a str,
) -> impl Stream<Item = Result<Record, ProviderError>> + 'a {
    paginate(move |cursor| provider.list_records_page(zone, cursor))
}

/// The single record behind `key`; ambiguous keys are a `DuplicateMatch`.
pub async fn get_record<P: RecordAccessor>(
    provider: &P,
    key: &RecordKey,
) -> Result<Record, ProviderError> {
    let mut found = provider.find_records(key).await?;
    match found.len() {
        0 => Err(ProviderError::NotFound(key.to_string())),
        1 => Ok(found.remove(0)),
        n => Err(ProviderError::DuplicateMatch(format!(
            "{n} records match {key}"
        ))),
    }
}

/// With `filter` set, true when any record under `key` matches it; without,
/// true when the key has at least one record.
pub async fn record_exists<P: RecordAccessor>(
    provider: &P,
    key: &RecordKey,
    filter: Option<&RecordSettings>,
) -> Result<bool, ProviderError> {
    let found = provider.find_records(key).await.optional()?.unwrap_or_default();
    Ok(match filter {
        Some(filter) => found.iter().any(|record| filter.matches(record)),
        None => !found.is_empty(),
    })
}

pub async fn flavor_exists<P: InstanceAccessor>(
    provider: &P,
    name: &str,
) -> Result<bool, ProviderError> {
    let flavors = provider.list_flavors().await?;
    Ok(flavors.iter().any(|flavor| flavor.name == name))
}

pub fn instances<P: InstanceAccessor>(
    provider: &P,
) -> impl Stream<Item = Result<Instance, ProviderError>> + '_ {
    paginate(move |cursor| provider.list_instances_page(cursor))
}

pub async fn instance_exists<P: InstanceAccessor>(
    provider: &P,
    name: &str,
    filter: &InstanceSettings,
) -> Result<bool, ProviderError> {
    let instance = provider.find_instance(name).await.optional()?;
    Ok(instance.is_some_and(|instance| filter.matches(&instance)))
}

pub fn databases<'a, P: DatabaseAccessor>(
    provider: &'a P,
    instance: &'a str,
) -> impl Stream<Item = Result<Database, ProviderError>> + 'a {
    paginate(move |cursor| provider.list_databases_page(instance, cursor))
}

pub async fn database_exists<P: DatabaseAccessor>(
    provider: &P,
    key: &DatabaseKey,
    filter: &DatabaseSettings,
) -> Result<bool, ProviderError> {
    let database = provider.find_database(key).await.optional()?;
    Ok(database.is_some_and(|database| filter.matches(&database)))
}

pub fn users<'a, P: UserAccessor>(
    provider: &'a P,
    instance: &'a str,
) -> impl Stream<Item = Result<User, ProviderError>> + 'a {
    paginate(move |cursor| provider.list_users_page(instance, cursor))
}

pub async fn user_exists<P: UserAccessor>(
    provider: &P,
    key: &UserKey,
    filter: &UserSettings,
) -> Result<bool, ProviderError> {
    let user = provider.find_user(key).await.optional()?;
    Ok(user.is_some_and(|user| filter.matches(&user)))
}

pub fn containers<P: ContainerAccessor>(
    provider: &P,
) -> impl Stream<Item = Result<Container, ProviderError>> + '_ {
    paginate(move |cursor| provider.list_containers_page(cursor))
}

pub async fn container_exists<P: ContainerAccessor>(
    provider: &P,
    name: &str,
    filter: &ContainerSettings,
) -> Result<bool, ProviderError> {
    let container = provider.find_container(name).await.optional()?;
    Ok(container.is_some_and(|container| filter.matches(&container)))
}

pub fn load_balancers<P: LoadBalancerAccessor>(
    provider: &P,
) -> impl Stream<Item = Result<LoadBalancer, ProviderError>> + '_ {
    paginate(move |cursor| provider.list_load_balancers_page(cursor))
}

pub async fn load_balancer_exists<P: LoadBalancerAccessor>(
    provider: &P,
    name: &str,
) -> Result<bool, ProviderError> {
    Ok(provider.find_load_balancer(name).await.optional()?.is_some())
}

pub fn images<P: ImageAccessor>(
    provider: &P,
) -> impl Stream<Item = Result<Image, ProviderError>> + '_ {
    paginate(move |cursor| provider.list_images_page(cursor))
}

pub async fn image_exists<P: ImageAccessor>(
    provider: &P,
    name: &str,
) -> Result<bool, ProviderError> {
    Ok(provider.find_image(name).await.optional()?.is_some())
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use mockall::predicate::eq;

    use super::*;
    use crate::model::RecordType;

    fn zone(ttl: u32) -> Zone {
        Zone {
            id: "zone-1".to_string(),
            name: "example.com".to_string(),
            email: "a@example.com".to_string(),
            ttl,
            nameservers: vec!["ns.rackspace.com".to_string()],
            comment: None,
        }
    }

    fn record(id: &str, data: &str) -> Record {
        Record {
            id: id.to_string(),
            name: "host.example.com".to_string(),
            record_type: RecordType::A,
            data: data.to_string(),
            ttl: 600,
            priority: None,
            comment: None,
        }
    }

    #[tokio::test]
    async fn zone_exists_is_false_when_not_found() {
        let mut provider = MockZoneAccessor::new();
        provider
            .expect_find_zone()
            .with(eq("example.com"))
            .returning(|name| {
                let name = name.to_string();
                Box::pin(async move { Err(ProviderError::NotFound(name)) })
            });

        let exists = zone_exists(&provider, "example.com", &ZoneSettings::default())
            .await
            .unwrap();
        assert!(!exists);
    }

    #[tokio::test]
    async fn zone_exists_propagates_other_failures() {
        let mut provider = MockZoneAccessor::new();
        provider.expect_find_zone().returning(|_| {
            Box::pin(async { Err(ProviderError::AuthenticationFailed("expired".to_string())) })
        });

        let result = zone_exists(&provider, "example.com", &ZoneSettings::default()).await;
        assert!(matches!(result, Err(ProviderError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn zone_exists_applies_filter() {
        let mut provider = MockZoneAccessor::new();
        provider
            .expect_find_zone()
            .returning(|_| Box::pin(async { Ok(zone(600)) }));

        let filter = ZoneSettings {
            ttl: Some(900),
            ..Default::default()
        };
        assert!(!zone_exists(&provider, "example.com", &filter).await.unwrap());
        assert!(zone_exists(&provider, "example.com", &ZoneSettings::default())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn zones_walk_all_pages() {
        let mut provider = MockZoneAccessor::new();
        provider
            .expect_list_zones_page()
            .with(eq(None))
            .return_once(|_| {
                Box::pin(async {
                    Ok(Page {
                        items: vec![zone(600)],
                        next: Some("1".to_string()),
                    })
                })
            });
        provider
            .expect_list_zones_page()
            .with(eq(Some("1".to_string())))
            .return_once(|_| Box::pin(async { Ok(Page::last(vec![zone(900)])) }));

        let all: Vec<Zone> = zones(&provider).try_collect().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[1].ttl, 900);
    }

    #[tokio::test]
    async fn get_record_rejects_ambiguous_keys() {
        let mut provider = MockRecordAccessor::new();
        provider.expect_find_records().returning(|_| {
            Box::pin(async {
                Ok(vec![
                    record("r1", "192.0.2.1"),
                    record("r2", "192.0.2.2"),
                ])
            })
        });

        let key = RecordKey::new("example.com", "host.example.com", "a").unwrap();
        let result = get_record(&provider, &key).await;
        assert!(matches!(result, Err(ProviderError::DuplicateMatch(_))));
    }

    #[tokio::test]
    async fn record_exists_with_and_without_filter() {
        let mut provider = MockRecordAccessor::new();
        provider
            .expect_find_records()
            .returning(|_| Box::pin(async { Ok(vec![record("r1", "192.0.2.1")]) }));

        let key = RecordKey::new("example.com", "host.example.com", "A").unwrap();
        assert!(record_exists(&provider, &key, None).await.unwrap());
        assert!(
            !record_exists(&provider, &key, Some(&RecordSettings::new("192.0.2.2")))
                .await
                .unwrap()
        );
        assert!(
            record_exists(&provider, &key, Some(&RecordSettings::new("192.0.2.1")))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn flavor_exists_by_name() {
        let mut provider = MockInstanceAccessor::new();
        provider.expect_list_flavors().returning(|| {
            Box::pin(async {
                Ok(vec![Flavor {
                    id: "1".to_string(),
                    name: "512MB Instance".to_string(),
                    ram: 512,
                }])
            })
        });

        assert!(flavor_exists(&provider, "512MB Instance").await.unwrap());
        assert!(!flavor_exists(&provider, "64GB Instance").await.unwrap());
    }
}
