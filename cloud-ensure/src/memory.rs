//! In-memory provider. Implements every accessor trait against plain maps and
//! keeps a log of mutating calls, so tests can assert exactly what an
//! `ensure` did.

use std::collections::BTreeMap;

use tokio::sync::Mutex;

use crate::{
    accessor::{
        ContainerAccessor, DatabaseAccessor, ImageAccessor, InstanceAccessor,
        LoadBalancerAccessor, RecordAccessor, UserAccessor, ZoneAccessor,
    },
    error::ProviderError,
    model::{
        Container, ContainerSettings, Database, DatabaseKey, DatabaseSettings, Flavor, Image,
        Instance, InstanceSettings, LoadBalancer, Record, RecordKey, RecordSettings, User,
        UserKey, UserSettings, Zone, ZoneSettings, DEFAULT_ZONE_TTL, PAGE_SIZE,
    },
    pagination::Page,
};

const NAMESERVERS: [&str; 2] = ["dns1.stabletransit.com", "dns2.stabletransit.com"];
const DEFAULT_CDN_TTL: u32 = 259_200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(String),
    Update(String),
    Delete(String),
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    zones: BTreeMap<String, Zone>,
    records: BTreeMap<String, Vec<Record>>,
    flavors: Vec<Flavor>,
    instances: BTreeMap<String, Instance>,
    databases: BTreeMap<String, BTreeMap<String, Database>>,
    users: BTreeMap<String, BTreeMap<String, User>>,
    containers: BTreeMap<String, Container>,
    load_balancers: BTreeMap<String, LoadBalancer>,
    images: BTreeMap<String, Image>,
    mutations: Vec<Mutation>,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn instance_mut(&mut self, name: &str) -> Result<&mut Instance, ProviderError> {
        self.instances
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(format!("instance {name}")))
    }

    fn require_instance(&self, name: &str) -> Result<(), ProviderError> {
        if self.instances.contains_key(name) {
            Ok(())
        } else {
            Err(ProviderError::NotFound(format!("instance {name}")))
        }
    }

    fn require_zone(&self, name: &str) -> Result<(), ProviderError> {
        if self.zones.contains_key(name) {
            Ok(())
        } else {
            Err(ProviderError::NotFound(format!("zone {name}")))
        }
    }

    fn flavor(&self, name: &str) -> Result<&Flavor, ProviderError> {
        self.flavors
            .iter()
            .find(|flavor| flavor.name == name)
            .ok_or_else(|| ProviderError::invalid(format!("invalid flavor {name}")))
    }
}

pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    page_size: usize,
}

impl Default for MemoryProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::with_page_size(PAGE_SIZE)
    }

    pub fn with_page_size(page_size: usize) -> Self {
        let flavors = [
            ("1", "512MB Instance", 512),
            ("2", "1GB Instance", 1024),
            ("3", "2GB Instance", 2048),
            ("4", "4GB Instance", 4096),
        ]
        .into_iter()
        .map(|(id, name, ram)| Flavor {
            id: id.to_string(),
            name: name.to_string(),
            ram,
        })
        .collect();
        MemoryProvider {
            state: Mutex::new(MemoryState {
                flavors,
                ..Default::default()
            }),
            page_size: page_size.max(1),
        }
    }

    pub async fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().await.mutations.clone()
    }

    pub async fn clear_mutations(&self) {
        self.state.lock().await.mutations.clear();
    }

    pub async fn insert_load_balancer(&self, load_balancer: LoadBalancer) {
        let mut state = self.state.lock().await;
        state
            .load_balancers
            .insert(load_balancer.name.clone(), load_balancer);
    }

    pub async fn insert_image(&self, image: Image) {
        let mut state = self.state.lock().await;
        state.images.insert(image.name.clone(), image);
    }

    fn page<'a, T: Clone + 'a>(
        &self,
        items: impl Iterator<Item = &'a T>,
        cursor: Option<String>,
    ) -> Result<Page<T>, ProviderError> {
        let offset = match cursor {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| ProviderError::invalid(format!("bad cursor {cursor:?}")))?,
            None => 0,
        };
        let mut items: Vec<T> = items.skip(offset).take(self.page_size + 1).cloned().collect();
        let next = if items.len() > self.page_size {
            items.truncate(self.page_size);
            Some((offset + self.page_size).to_string())
        } else {
            None
        };
        Ok(Page { items, next })
    }
}

impl ZoneAccessor for MemoryProvider {
    async fn list_zones_page(&self, cursor: Option<String>) -> Result<Page<Zone>, ProviderError> {
        let state = self.state.lock().await;
        self.page(state.zones.values(), cursor)
    }

    async fn find_zone(&self, name: &str) -> Result<Zone, ProviderError> {
        let state = self.state.lock().await;
        state
            .zones
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("zone {name}")))
    }

    async fn create_zone(
        &self,
        name: &str,
        settings: &ZoneSettings,
    ) -> Result<Zone, ProviderError> {
        settings.validate_create()?;
        let mut state = self.state.lock().await;
        if state.zones.contains_key(name) {
            return Err(ProviderError::DuplicateMatch(format!("zone {name} already exists")));
        }
        let zone = Zone {
            id: state.next_id("zone"),
            name: name.to_string(),
            email: settings.email.clone().unwrap_or_default(),
            ttl: settings.ttl.unwrap_or(DEFAULT_ZONE_TTL),
            nameservers: NAMESERVERS.iter().map(|ns| ns.to_string()).collect(),
            comment: settings.comment.clone(),
        };
        state.zones.insert(name.to_string(), zone.clone());
        state.records.entry(name.to_string()).or_default();
        state.mutations.push(Mutation::Create(format!("zone {name}")));
        Ok(zone)
    }

    async fn update_zone(
        &self,
        name: &str,
        settings: &ZoneSettings,
    ) -> Result<Zone, ProviderError> {
        settings.validate_update()?;
        let mut state = self.state.lock().await;
        let zone = state
            .zones
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(format!("zone {name}")))?;
        if let Some(email) = &settings.email {
            zone.email = email.clone();
        }
        if let Some(ttl) = settings.ttl {
            zone.ttl = ttl;
        }
        if let Some(comment) = &settings.comment {
            zone.comment = Some(comment.clone());
        }
        let zone = zone.clone();
        state.mutations.push(Mutation::Update(format!("zone {name}")));
        Ok(zone)
    }

    async fn delete_zone(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state
            .zones
            .remove(name)
            .ok_or_else(|| ProviderError::NotFound(format!("zone {name}")))?;
        state.records.remove(name);
        state.mutations.push(Mutation::Delete(format!("zone {name}")));
        Ok(())
    }
}

impl RecordAccessor for MemoryProvider {
    async fn list_records_page(
        &self,
        zone: &str,
        cursor: Option<String>,
    ) -> Result<Page<Record>, ProviderError> {
        let state = self.state.lock().await;
        state.require_zone(zone)?;
        let records = state.records.get(zone).into_iter().flatten();
        self.page(records, cursor)
    }

    async fn find_records(&self, key: &RecordKey) -> Result<Vec<Record>, ProviderError> {
        let state = self.state.lock().await;
        state.require_zone(&key.zone)?;
        Ok(state
            .records
            .get(&key.zone)
            .into_iter()
            .flatten()
            .filter(|record| record.name == key.name && record.record_type == key.record_type)
            .cloned()
            .collect())
    }

    async fn create_record(
        &self,
        key: &RecordKey,
        settings: &RecordSettings,
    ) -> Result<Record, ProviderError> {
        settings.validate(key.record_type)?;
        let mut state = self.state.lock().await;
        state.require_zone(&key.zone)?;
        let record = Record {
            id: state.next_id("record"),
            name: key.name.clone(),
            record_type: key.record_type,
            data: settings.data.clone(),
            ttl: settings.create_ttl(),
            priority: settings.priority,
            comment: settings.comment.clone(),
        };
        state
            .records
            .entry(key.zone.clone())
            .or_default()
            .push(record.clone());
        state
            .mutations
            .push(Mutation::Create(format!("record {}", key.name)));
        Ok(record)
    }

    async fn update_record(
        &self,
        zone: &str,
        id: &str,
        settings: &RecordSettings,
    ) -> Result<Record, ProviderError> {
        let mut state = self.state.lock().await;
        state.require_zone(zone)?;
        let record = state
            .records
            .get_mut(zone)
            .and_then(|records| records.iter_mut().find(|record| record.id == id))
            .ok_or_else(|| ProviderError::NotFound(format!("record {id} in {zone}")))?;
        settings.validate(record.record_type)?;
        record.data = settings.data.clone();
        if let Some(ttl) = settings.ttl {
            record.ttl = ttl;
        }
        if let Some(priority) = settings.priority {
            record.priority = Some(priority);
        }
        if let Some(comment) = &settings.comment {
            record.comment = Some(comment.clone());
        }
        let record = record.clone();
        state
            .mutations
            .push(Mutation::Update(format!("record {}", record.name)));
        Ok(record)
    }

    async fn delete_record(&self, zone: &str, id: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.require_zone(zone)?;
        let records = state.records.entry(zone.to_string()).or_default();
        let index = records
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| ProviderError::NotFound(format!("record {id} in {zone}")))?;
        let record = records.remove(index);
        state
            .mutations
            .push(Mutation::Delete(format!("record {}", record.name)));
        Ok(())
    }
}

impl InstanceAccessor for MemoryProvider {
    async fn list_flavors(&self) -> Result<Vec<Flavor>, ProviderError> {
        Ok(self.state.lock().await.flavors.clone())
    }

    async fn list_instances_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Instance>, ProviderError> {
        let state = self.state.lock().await;
        self.page(state.instances.values(), cursor)
    }

    async fn find_instance(&self, name: &str) -> Result<Instance, ProviderError> {
        let state = self.state.lock().await;
        state
            .instances
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("instance {name}")))
    }

    async fn create_instance(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<Instance, ProviderError> {
        settings.validate_create()?;
        let mut state = self.state.lock().await;
        if state.instances.contains_key(name) {
            return Err(ProviderError::DuplicateMatch(format!(
                "instance {name} already exists"
            )));
        }
        let flavor = state.flavor(settings.flavor.as_deref().unwrap_or_default())?.name.clone();
        let id = state.next_id("instance");
        let instance = Instance {
            hostname: Some(format!("{id}.rackspaceclouddb.com")),
            id,
            name: name.to_string(),
            status: "ACTIVE".to_string(),
            flavor,
            volume_size: settings.volume_size.unwrap_or_default(),
        };
        state.instances.insert(name.to_string(), instance.clone());
        state
            .mutations
            .push(Mutation::Create(format!("instance {name}")));
        Ok(instance)
    }

    async fn update_instance(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<Instance, ProviderError> {
        settings.validate()?;
        let mut state = self.state.lock().await;
        let flavor = match &settings.flavor {
            Some(flavor) => Some(state.flavor(flavor)?.name.clone()),
            None => None,
        };
        let instance = state.instance_mut(name)?;
        if let Some(size) = settings.volume_size {
            if size < instance.volume_size {
                return Err(ProviderError::invalid(format!(
                    "volume of {name} can only grow beyond {} GB",
                    instance.volume_size
                )));
            }
            instance.volume_size = size;
        }
        if let Some(flavor) = flavor {
            instance.flavor = flavor;
        }
        let instance = instance.clone();
        state
            .mutations
            .push(Mutation::Update(format!("instance {name}")));
        Ok(instance)
    }

    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state
            .instances
            .remove(name)
            .ok_or_else(|| ProviderError::NotFound(format!("instance {name}")))?;
        state.databases.remove(name);
        state.users.remove(name);
        state
            .mutations
            .push(Mutation::Delete(format!("instance {name}")));
        Ok(())
    }
}

impl DatabaseAccessor for MemoryProvider {
    async fn list_databases_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<Database>, ProviderError> {
        let state = self.state.lock().await;
        state.require_instance(instance)?;
        let databases = state.databases.get(instance).into_iter().flat_map(|dbs| dbs.values());
        self.page(databases, cursor)
    }

    async fn find_database(&self, key: &DatabaseKey) -> Result<Database, ProviderError> {
        let state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        state
            .databases
            .get(&key.instance)
            .and_then(|dbs| dbs.get(&key.name))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("database {key}")))
    }

    async fn create_database(
        &self,
        key: &DatabaseKey,
        settings: &DatabaseSettings,
    ) -> Result<Database, ProviderError> {
        let mut state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        let databases = state.databases.entry(key.instance.clone()).or_default();
        if databases.contains_key(&key.name) {
            return Err(ProviderError::DuplicateMatch(format!(
                "database {key} already exists"
            )));
        }
        let database = Database {
            name: key.name.clone(),
            character_set: Some(
                settings
                    .character_set
                    .clone()
                    .unwrap_or_else(|| "utf8".to_string()),
            ),
            collate: Some(
                settings
                    .collate
                    .clone()
                    .unwrap_or_else(|| "utf8_general_ci".to_string()),
            ),
        };
        databases.insert(key.name.clone(), database.clone());
        state.mutations.push(Mutation::Create(format!("database {key}")));
        Ok(database)
    }

    async fn update_database(
        &self,
        key: &DatabaseKey,
        _settings: &DatabaseSettings,
    ) -> Result<Database, ProviderError> {
        let state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        if !state
            .databases
            .get(&key.instance)
            .is_some_and(|dbs| dbs.contains_key(&key.name))
        {
            return Err(ProviderError::NotFound(format!("database {key}")));
        }
        Err(ProviderError::invalid(format!(
            "character set and collation of database {key} cannot be changed"
        )))
    }

    async fn delete_database(&self, key: &DatabaseKey) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        state
            .databases
            .get_mut(&key.instance)
            .and_then(|dbs| dbs.remove(&key.name))
            .ok_or_else(|| ProviderError::NotFound(format!("database {key}")))?;
        state.mutations.push(Mutation::Delete(format!("database {key}")));
        Ok(())
    }
}

impl UserAccessor for MemoryProvider {
    async fn list_users_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<User>, ProviderError> {
        let state = self.state.lock().await;
        state.require_instance(instance)?;
        let users = state.users.get(instance).into_iter().flat_map(|users| users.values());
        self.page(users, cursor)
    }

    async fn find_user(&self, key: &UserKey) -> Result<User, ProviderError> {
        let state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        state
            .users
            .get(&key.instance)
            .and_then(|users| users.get(&key.name))
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("user {key}")))
    }

    async fn create_user(
        &self,
        key: &UserKey,
        settings: &UserSettings,
    ) -> Result<User, ProviderError> {
        settings.validate_create()?;
        let mut state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        let users = state.users.entry(key.instance.clone()).or_default();
        if users.contains_key(&key.name) {
            return Err(ProviderError::DuplicateMatch(format!("user {key} already exists")));
        }
        let user = User {
            name: key.name.clone(),
            host: settings.host_or_default(),
            databases: settings.databases.clone().unwrap_or_default(),
        };
        users.insert(key.name.clone(), user.clone());
        state.mutations.push(Mutation::Create(format!("user {key}")));
        Ok(user)
    }

    async fn update_user(
        &self,
        key: &UserKey,
        settings: &UserSettings,
    ) -> Result<User, ProviderError> {
        settings.validate()?;
        let mut state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        let user = state
            .users
            .get_mut(&key.instance)
            .and_then(|users| users.get_mut(&key.name))
            .ok_or_else(|| ProviderError::NotFound(format!("user {key}")))?;
        if let Some(host) = &settings.host {
            user.host = host.clone();
        }
        if let Some(databases) = &settings.databases {
            user.databases = databases.clone();
        }
        let user = user.clone();
        state.mutations.push(Mutation::Update(format!("user {key}")));
        Ok(user)
    }

    async fn delete_user(&self, key: &UserKey) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state.require_instance(&key.instance)?;
        state
            .users
            .get_mut(&key.instance)
            .and_then(|users| users.remove(&key.name))
            .ok_or_else(|| ProviderError::NotFound(format!("user {key}")))?;
        state.mutations.push(Mutation::Delete(format!("user {key}")));
        Ok(())
    }
}

impl ContainerAccessor for MemoryProvider {
    async fn list_containers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Container>, ProviderError> {
        let state = self.state.lock().await;
        self.page(state.containers.values(), cursor)
    }

    async fn find_container(&self, name: &str) -> Result<Container, ProviderError> {
        let state = self.state.lock().await;
        state
            .containers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("container {name}")))
    }

    async fn create_container(
        &self,
        name: &str,
        settings: &ContainerSettings,
    ) -> Result<Container, ProviderError> {
        settings.validate()?;
        let mut state = self.state.lock().await;
        if state.containers.contains_key(name) {
            return Err(ProviderError::DuplicateMatch(format!(
                "container {name} already exists"
            )));
        }
        let mut container = Container {
            name: name.to_string(),
            object_count: 0,
            bytes_used: 0,
            cdn_enabled: false,
            cdn_uri: None,
            cdn_ttl: None,
        };
        apply_cdn(&mut container, settings);
        state.containers.insert(name.to_string(), container.clone());
        state
            .mutations
            .push(Mutation::Create(format!("container {name}")));
        Ok(container)
    }

    async fn update_container(
        &self,
        name: &str,
        settings: &ContainerSettings,
    ) -> Result<Container, ProviderError> {
        settings.validate()?;
        let mut state = self.state.lock().await;
        let container = state
            .containers
            .get_mut(name)
            .ok_or_else(|| ProviderError::NotFound(format!("container {name}")))?;
        apply_cdn(container, settings);
        let container = container.clone();
        state
            .mutations
            .push(Mutation::Update(format!("container {name}")));
        Ok(container)
    }

    async fn delete_container(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state
            .containers
            .remove(name)
            .ok_or_else(|| ProviderError::NotFound(format!("container {name}")))?;
        state
            .mutations
            .push(Mutation::Delete(format!("container {name}")));
        Ok(())
    }
}

fn apply_cdn(container: &mut Container, settings: &ContainerSettings) {
    if let Some(enabled) = settings.cdn_enabled {
        container.cdn_enabled = enabled;
    }
    if container.cdn_enabled {
        container
            .cdn_uri
            .get_or_insert_with(|| format!("https://cdn.memory.invalid/{}", container.name));
        container.cdn_ttl = settings.cdn_ttl.or(container.cdn_ttl).or(Some(DEFAULT_CDN_TTL));
    } else if let Some(ttl) = settings.cdn_ttl {
        container.cdn_ttl = Some(ttl);
    }
}

impl LoadBalancerAccessor for MemoryProvider {
    async fn list_load_balancers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancer>, ProviderError> {
        let state = self.state.lock().await;
        self.page(state.load_balancers.values(), cursor)
    }

    async fn find_load_balancer(&self, name: &str) -> Result<LoadBalancer, ProviderError> {
        let state = self.state.lock().await;
        state
            .load_balancers
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("load balancer {name}")))
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<(), ProviderError> {
        let mut state = self.state.lock().await;
        state
            .load_balancers
            .remove(name)
            .ok_or_else(|| ProviderError::NotFound(format!("load balancer {name}")))?;
        state
            .mutations
            .push(Mutation::Delete(format!("load balancer {name}")));
        Ok(())
    }
}

impl ImageAccessor for MemoryProvider {
    async fn list_images_page(&self, cursor: Option<String>) -> Result<Page<Image>, ProviderError> {
        let state = self.state.lock().await;
        self.page(state.images.values(), cursor)
    }

    async fn find_image(&self, name: &str) -> Result<Image, ProviderError> {
        let state = self.state.lock().await;
        state
            .images
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound(format!("image {name}")))
    }
}
