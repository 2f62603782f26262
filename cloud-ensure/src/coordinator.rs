use std::{future::Future, sync::Arc};

use crate::{
    accessor::{
        container_exists, database_exists, instance_exists, record_exists, user_exists,
        zone_exists, ContainerAccessor, DatabaseAccessor, InstanceAccessor, RecordAccessor,
        UserAccessor, ZoneAccessor,
    },
    error::{OptionalExt, ProviderError},
    model::{
        Container, ContainerSettings, Database, DatabaseKey, DatabaseSettings, Instance,
        InstanceSettings, Record, RecordKey, RecordSettings, User, UserKey, UserSettings, Zone,
        ZoneSettings,
    },
    outcome::{Change, Outcome},
};

const KIND_ZONE: &str = "DNS zone";
const KIND_INSTANCE: &str = "Database instance";
const KIND_DATABASE: &str = "Database";
const KIND_USER: &str = "Database user";
const KIND_CONTAINER: &str = "Container";

/// Drives resources toward a desired state.
///
/// Every `ensure_*` call reads the provider afresh and makes at most one
/// mutating call. Invalid settings are returned as `Err` before the provider
/// is contacted; provider failures become a failed [`Outcome`].
///
/// Nothing guards the window between the existence check and the mutation:
/// a concurrent writer can still create or change the resource in between.
pub struct Coordinator<P> {
    pub provider: Arc<P>,
    pub dry_run: bool,
}

impl<P> Coordinator<P> {
    pub fn new(provider: Arc<P>, dry_run: bool) -> Self {
        Coordinator { provider, dry_run }
    }

    /// The shared reconcile shape. `present`, `create` and `update` are
    /// only called on the branch that needs them, so a dry run or an
    /// up-to-date resource never reaches a mutating accessor method.
    async fn reconcile<T, Present, Create, Update>(
        &self,
        kind: &str,
        name: &str,
        matches: impl Future<Output = Result<bool, ProviderError>>,
        present: impl FnOnce() -> Present,
        create: impl FnOnce() -> Create,
        update: impl FnOnce() -> Update,
    ) -> Result<Outcome<T>, ProviderError>
    where
        Present: Future<Output = Result<bool, ProviderError>>,
        Create: Future<Output = Result<T, ProviderError>>,
        Update: Future<Output = Result<T, ProviderError>>,
    {
        if matches.await? {
            tracing::debug!("{} {} is up to date.", kind, name);
            return Ok(Outcome::unchanged(name));
        }

        if self.dry_run {
            tracing::info!("{} {} would be created or updated.", kind, name);
            return Ok(Outcome::pending(name, kind));
        }

        let change = if present().await? {
            tracing::info!("Updating {} {}..", kind, name);
            Change::Updated(update().await?)
        } else {
            tracing::info!("Creating {} {}..", kind, name);
            Change::New(create().await?)
        };

        Ok(Outcome::changed(name, kind, change))
    }
}

impl<P> Coordinator<P>
where
    P: ZoneAccessor,
{
    pub async fn ensure_zone(
        &self,
        name: &str,
        desired: &ZoneSettings,
    ) -> Result<Outcome<Zone>, ProviderError> {
        desired.validate()?;
        let provider = &*self.provider;
        let unfiltered = ZoneSettings::default();
        let outcome = self
            .reconcile(
                KIND_ZONE,
                name,
                zone_exists(provider, name, desired),
                || zone_exists(provider, name, &unfiltered),
                || provider.create_zone(name, desired),
                || provider.update_zone(name, desired),
            )
            .await;
        Ok(outcome.unwrap_or_else(|err| failed(KIND_ZONE, name, err)))
    }
}

impl<P> Coordinator<P>
where
    P: RecordAccessor,
{
    /// Records may share a key, so the update target is chosen by `data`:
    /// the record already holding the desired data is updated in place;
    /// otherwise a sibling is created when `allow_multiple` is set, or the
    /// only record under the key is overwritten.
    pub async fn ensure_record(
        &self,
        key: &RecordKey,
        desired: &RecordSettings,
        allow_multiple: bool,
    ) -> Result<Outcome<Record>, ProviderError> {
        desired.validate(key.record_type)?;
        let outcome = self.reconcile_record(key, desired, allow_multiple).await;
        Ok(outcome.unwrap_or_else(|err| failed(&record_kind(key), &key.name, err)))
    }

    async fn reconcile_record(
        &self,
        key: &RecordKey,
        desired: &RecordSettings,
        allow_multiple: bool,
    ) -> Result<Outcome<Record>, ProviderError> {
        let provider = &*self.provider;
        let kind = record_kind(key);

        if record_exists(provider, key, Some(desired)).await? {
            tracing::debug!("{} is up to date.", key);
            return Ok(Outcome::unchanged(&key.name));
        }

        if self.dry_run {
            tracing::info!("{} would be created or updated.", key);
            return Ok(Outcome::pending(&key.name, &kind));
        }

        let existing = provider
            .find_records(key)
            .await
            .optional()?
            .unwrap_or_default();

        let change = if existing.is_empty() {
            tracing::info!("Creating {}..", key);
            Change::New(provider.create_record(key, desired).await?)
        } else if let Some(record) = existing.iter().find(|r| r.data == desired.data) {
            tracing::info!("Updating {} ({})..", key, record.id);
            Change::Updated(provider.update_record(&key.zone, &record.id, desired).await?)
        } else if allow_multiple {
            tracing::info!(
                "Adding {} next to {} existing record(s)..",
                key,
                existing.len()
            );
            Change::New(provider.create_record(key, desired).await?)
        } else {
            let [record] = existing.as_slice() else {
                return Err(ProviderError::DuplicateMatch(format!(
                    "{} records match {key}, cannot pick one to overwrite",
                    existing.len()
                )));
            };
            tracing::info!("Overwriting {} ({})..", key, record.id);
            Change::Updated(provider.update_record(&key.zone, &record.id, desired).await?)
        };

        Ok(Outcome::changed(&key.name, &kind, change))
    }
}

impl<P> Coordinator<P>
where
    P: InstanceAccessor,
{
    pub async fn ensure_instance(
        &self,
        name: &str,
        desired: &InstanceSettings,
    ) -> Result<Outcome<Instance>, ProviderError> {
        desired.validate()?;
        let provider = &*self.provider;
        let unfiltered = InstanceSettings::default();
        let outcome = self
            .reconcile(
                KIND_INSTANCE,
                name,
                instance_exists(provider, name, desired),
                || instance_exists(provider, name, &unfiltered),
                || provider.create_instance(name, desired),
                || provider.update_instance(name, desired),
            )
            .await;
        Ok(outcome.unwrap_or_else(|err| failed(KIND_INSTANCE, name, err)))
    }
}

impl<P> Coordinator<P>
where
    P: DatabaseAccessor,
{
    pub async fn ensure_database(
        &self,
        key: &DatabaseKey,
        desired: &DatabaseSettings,
    ) -> Result<Outcome<Database>, ProviderError> {
        let provider = &*self.provider;
        let unfiltered = DatabaseSettings::default();
        let outcome = self
            .reconcile(
                KIND_DATABASE,
                &key.name,
                database_exists(provider, key, desired),
                || database_exists(provider, key, &unfiltered),
                || provider.create_database(key, desired),
                || provider.update_database(key, desired),
            )
            .await;
        Ok(outcome.unwrap_or_else(|err| failed(KIND_DATABASE, &key.to_string(), err)))
    }
}

impl<P> Coordinator<P>
where
    P: UserAccessor,
{
    pub async fn ensure_user(
        &self,
        key: &UserKey,
        desired: &UserSettings,
    ) -> Result<Outcome<User>, ProviderError> {
        desired.validate()?;
        let provider = &*self.provider;
        let unfiltered = UserSettings::default();
        let outcome = self
            .reconcile(
                KIND_USER,
                &key.name,
                user_exists(provider, key, desired),
                || user_exists(provider, key, &unfiltered),
                || provider.create_user(key, desired),
                || provider.update_user(key, desired),
            )
            .await;
        Ok(outcome.unwrap_or_else(|err| failed(KIND_USER, &key.to_string(), err)))
    }
}

impl<P> Coordinator<P>
where
    P: ContainerAccessor,
{
    pub async fn ensure_container(
        &self,
        name: &str,
        desired: &ContainerSettings,
    ) -> Result<Outcome<Container>, ProviderError> {
        desired.validate()?;
        let provider = &*self.provider;
        let unfiltered = ContainerSettings::default();
        let outcome = self
            .reconcile(
                KIND_CONTAINER,
                name,
                container_exists(provider, name, desired),
                || container_exists(provider, name, &unfiltered),
                || provider.create_container(name, desired),
                || provider.update_container(name, desired),
            )
            .await;
        Ok(outcome.unwrap_or_else(|err| failed(KIND_CONTAINER, name, err)))
    }
}

fn record_kind(key: &RecordKey) -> String {
    format!("{} record", key.record_type)
}

fn failed<T>(kind: &str, name: &str, err: ProviderError) -> Outcome<T> {
    match &err {
        ProviderError::AuthenticationFailed(_) => {
            tracing::error!("Cannot proceed with {} {}: {}", kind, name, err)
        }
        _ => tracing::error!("Failed to ensure {} {}: {}", kind, name, err),
    }
    Outcome::failed(name, format!("Unable to ensure {kind} {name}: {err}"))
}
