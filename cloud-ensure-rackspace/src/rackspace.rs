use std::{collections::BTreeMap, str::FromStr, time::Duration};

use anyhow::anyhow;
use duration_str::deserialize_option_duration;
use futures::{future, TryStreamExt};
use reqwest::{
    header::ACCEPT, Client, IntoUrl, Method, RequestBuilder, Response, StatusCode, Url,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::json;

use cloud_ensure::accessor::{
    ContainerAccessor, DatabaseAccessor, ImageAccessor, InstanceAccessor, LoadBalancerAccessor,
    RecordAccessor, UserAccessor, ZoneAccessor,
};
use cloud_ensure::error::{OptionalExt, ProviderError};
use cloud_ensure::model::{
    Container, ContainerSettings, Database, DatabaseKey, DatabaseSettings, Flavor, Image,
    Instance, InstanceSettings, LoadBalancer, Record, RecordKey, RecordSettings, RecordType, User,
    UserKey, UserSettings, Zone, ZoneSettings, PAGE_SIZE,
};
use cloud_ensure::pagination::{paginate, Page};

const DEFAULT_IDENTITY_URL: &str = "https://identity.api.rackspacecloud.com/v2.0";
const DEFAULT_JOB_POLL_INTERVAL: Duration = Duration::from_secs(2);
const MAX_JOB_POLLS: usize = 150;
const AUTH_HEADER: &str = "X-Auth-Token";

const SERVICE_DNS: &str = "cloudDNS";
const SERVICE_DATABASES: &str = "cloudDatabases";
const SERVICE_FILES: &str = "cloudFiles";
const SERVICE_CDN: &str = "cloudFilesCDN";
const SERVICE_LOAD_BALANCERS: &str = "cloudLoadBalancers";
const SERVICE_SERVERS: &str = "cloudServersOpenStack";

#[derive(Deserialize)]
pub struct RackspaceSettings {
    #[serde(rename = "RACKSPACE_USERNAME")]
    pub username: String,
    #[serde(rename = "RACKSPACE_API_KEY")]
    pub api_key: String,
    #[serde(rename = "RACKSPACE_REGION")]
    pub region: String,
    #[serde(rename = "RACKSPACE_IDENTITY_URL", default = "default_identity_url")]
    pub identity_url: String,
    #[serde(
        rename = "RACKSPACE_JOB_POLL_INTERVAL",
        default,
        deserialize_with = "deserialize_option_duration"
    )]
    pub job_poll_interval: Option<Duration>,
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

pub struct Rackspace {
    client: Client,
    token: String,
    region: String,
    endpoints: BTreeMap<String, String>,
    job_poll_interval: Duration,
}

impl Rackspace {
    /// Authenticates with the API key and resolves the service endpoints of
    /// the configured region.
    pub async fn connect(settings: RackspaceSettings) -> Result<Self, ProviderError> {
        let job_poll_interval = settings
            .job_poll_interval
            .unwrap_or(DEFAULT_JOB_POLL_INTERVAL);

        let client = Client::new();
        let body = json!({
            "auth": {
                "RAX-KSKEY:apiKeyCredentials": {
                    "username": settings.username,
                    "apiKey": settings.api_key,
                }
            }
        });
        tracing::debug!("Authenticating as {}..", settings.username);
        let response = client
            .post(format!("{}/tokens", settings.identity_url))
            .json(&body)
            .send()
            .await
            .map_err(transport)?;
        let response = match check(response).await {
            Err(err @ ProviderError::AuthenticationFailed(_)) => {
                tracing::error!(
                    "Unable to authenticate with the provided credentials for {}: {}",
                    settings.username,
                    err
                );
                return Err(err);
            }
            other => other?,
        };
        let identity: IdentityResponse = response.json().await.map_err(decode)?;
        let endpoints = resolve_endpoints(&identity.access.service_catalog, &settings.region);
        tracing::debug!("Resolved {} service endpoints.", endpoints.len());

        Ok(Rackspace {
            client,
            token: identity.access.token.id,
            region: settings.region,
            endpoints,
            job_poll_interval,
        })
    }

    fn endpoint(&self, service: &str) -> Result<&str, ProviderError> {
        self.endpoints.get(service).map(String::as_str).ok_or_else(|| {
            ProviderError::Unavailable(format!(
                "{service} is not available in region {}",
                self.region
            ))
        })
    }

    /// The service endpoint with `segments` appended, each one
    /// percent-encoded as a single path segment.
    fn endpoint_url(&self, service: &str, segments: &[&str]) -> Result<Url, ProviderError> {
        segment_url(self.endpoint(service)?, segments)
    }

    fn request(&self, method: Method, url: impl IntoUrl) -> RequestBuilder {
        self.client
            .request(method, url)
            .header(AUTH_HEADER, &self.token)
            .header(ACCEPT, "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ProviderError> {
        let response = request.send().await.map_err(transport)?;
        check(response).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ProviderError> {
        let response = self.send(request).await?;
        response.json().await.map_err(decode)
    }

    /// DNS mutations return an asynchronous job; poll its callback until it
    /// settles and hand back the job's response body, if any.
    async fn run_job(
        &self,
        request: RequestBuilder,
    ) -> Result<Option<serde_json::Value>, ProviderError> {
        let mut job: DnsJob = self.get_json(request).await?;
        for _ in 0..MAX_JOB_POLLS {
            match job.status.as_str() {
                "COMPLETED" => return Ok(job.response),
                "ERROR" => return Err(job_error(job.error)),
                _ => {}
            }
            tokio::time::sleep(self.job_poll_interval).await;
            let request = self
                .request(Method::GET, job.callback_url.clone())
                .query(&[("showDetails", "true")]);
            job = self.get_json(request).await?;
        }
        Err(ProviderError::Unavailable(format!(
            "DNS job {} did not finish",
            job.callback_url
        )))
    }

    // DNS

    async fn zone_page(&self, cursor: Option<String>) -> Result<Page<Zone>, ProviderError> {
        let offset = parse_offset(cursor)?;
        let url = format!("{}/domains", self.endpoint(SERVICE_DNS)?);
        let request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE), ("offset", offset)]);
        let list: DnsDomainList = self.get_json(request).await?;
        let zones = list.domains.into_iter().map(from_dns_domain).collect();
        Ok(offset_page(zones, offset, list.total_entries))
    }

    async fn zone_id(&self, name: &str) -> Result<String, ProviderError> {
        let url = format!("{}/domains", self.endpoint(SERVICE_DNS)?);
        let request = self.request(Method::GET, url).query(&[("name", name)]);
        let list: DnsDomainList = self.get_json(request).await?;
        let matching: Vec<DnsDomain> = list
            .domains
            .into_iter()
            .filter(|domain| domain.name == name)
            .collect();
        let domain = single(matching, || format!("zone {name}"))?;
        Ok(domain.id.into())
    }

    async fn zone_by_name(&self, name: &str) -> Result<Zone, ProviderError> {
        let id = self.zone_id(name).await?;
        let url = format!("{}/domains/{id}", self.endpoint(SERVICE_DNS)?);
        let request = self
            .request(Method::GET, url)
            .query(&[("showRecords", "false"), ("showSubdomains", "false")]);
        let domain: DnsDomain = self.get_json(request).await?;
        Ok(from_dns_domain(domain))
    }

    async fn record_page(
        &self,
        zone_id: &str,
        filter: Option<&RecordKey>,
        cursor: Option<String>,
    ) -> Result<Page<Record>, ProviderError> {
        let offset = parse_offset(cursor)?;
        let url = format!("{}/domains/{zone_id}/records", self.endpoint(SERVICE_DNS)?);
        let mut request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE), ("offset", offset)]);
        if let Some(key) = filter {
            request = request.query(&[
                ("type", key.record_type.as_str()),
                ("name", key.name.as_str()),
            ]);
        }
        let list: DnsRecordList = self.get_json(request).await?;
        let page = offset_page(list.records, offset, list.total_entries);
        Ok(Page {
            items: from_dns_records(page.items),
            next: page.next,
        })
    }

    async fn record_by_id(&self, zone_id: &str, id: &str) -> Result<Record, ProviderError> {
        let url = format!("{}/domains/{zone_id}/records/{id}", self.endpoint(SERVICE_DNS)?);
        let record: DnsRecord = self.get_json(self.request(Method::GET, url)).await?;
        from_dns_record(record)
    }

    // Cloud Databases

    async fn flavors(&self) -> Result<Vec<Flavor>, ProviderError> {
        let url = format!("{}/flavors", self.endpoint(SERVICE_DATABASES)?);
        let list: TroveFlavorList = self.get_json(self.request(Method::GET, url)).await?;
        Ok(list
            .flavors
            .into_iter()
            .map(|flavor| Flavor {
                id: flavor.id.into(),
                name: flavor.name,
                ram: flavor.ram,
            })
            .collect())
    }

    async fn flavor_by_name(&self, name: &str) -> Result<Flavor, ProviderError> {
        self.flavors()
            .await?
            .into_iter()
            .find(|flavor| flavor.name == name)
            .ok_or_else(|| ProviderError::invalid(format!("invalid flavor {name}")))
    }

    async fn instance_page(&self, cursor: Option<String>) -> Result<Page<Instance>, ProviderError> {
        let flavors = self.flavors().await?;
        let url = format!("{}/instances", self.endpoint(SERVICE_DATABASES)?);
        let request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE)])
            .query(&marker(&cursor));
        let list: TroveInstanceList = self.get_json(request).await?;
        let has_next = list.links.iter().any(|link| link.rel == "next");
        let instances: Vec<Instance> = list
            .instances
            .into_iter()
            .map(|instance| from_trove_instance(instance, &flavors))
            .collect();
        let next = instances
            .last()
            .filter(|_| has_next)
            .map(|instance| instance.id.clone());
        Ok(Page { items: instances, next })
    }

    async fn instance_by_name(&self, name: &str) -> Result<Instance, ProviderError> {
        let matching: Vec<Instance> = paginate(|cursor| self.instance_page(cursor))
            .try_filter(|instance| future::ready(instance.name == name))
            .try_collect()
            .await?;
        single(matching, || format!("instance {name}"))
    }

    async fn resize(
        &self,
        instance_id: &str,
        resize: serde_json::Value,
    ) -> Result<(), ProviderError> {
        let url = format!(
            "{}/instances/{instance_id}/action",
            self.endpoint(SERVICE_DATABASES)?
        );
        let request = self
            .request(Method::POST, url)
            .json(&json!({ "resize": resize }));
        self.send(request).await?;
        Ok(())
    }

    async fn database_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<Database>, ProviderError> {
        let instance = self.instance_by_name(instance).await?;
        let url = format!(
            "{}/instances/{}/databases",
            self.endpoint(SERVICE_DATABASES)?,
            instance.id
        );
        let request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE)])
            .query(&marker(&cursor));
        let list: TroveDatabaseList = self.get_json(request).await?;
        let has_next = list.links.iter().any(|link| link.rel == "next");
        let databases: Vec<Database> = list
            .databases
            .into_iter()
            .map(|database| Database {
                name: database.name,
                character_set: database.character_set,
                collate: database.collate,
            })
            .collect();
        let next = databases
            .last()
            .filter(|_| has_next)
            .map(|database| database.name.clone());
        Ok(Page {
            items: databases,
            next,
        })
    }

    async fn database_by_key(&self, key: &DatabaseKey) -> Result<Database, ProviderError> {
        let matching: Vec<Database> = paginate(|cursor| self.database_page(&key.instance, cursor))
            .try_filter(|database| future::ready(database.name == key.name))
            .try_collect()
            .await?;
        single(matching, || format!("database {key}"))
    }

    async fn user_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<User>, ProviderError> {
        let instance = self.instance_by_name(instance).await?;
        let url = format!(
            "{}/instances/{}/users",
            self.endpoint(SERVICE_DATABASES)?,
            instance.id
        );
        let request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE)])
            .query(&marker(&cursor));
        let list: TroveUserList = self.get_json(request).await?;
        let has_next = list.links.iter().any(|link| link.rel == "next");
        let users: Vec<User> = list.users.into_iter().map(from_trove_user).collect();
        let next = users
            .last()
            .filter(|_| has_next)
            .map(|user| user.name.clone());
        Ok(Page { items: users, next })
    }

    async fn user_by_key(&self, key: &UserKey) -> Result<User, ProviderError> {
        let matching: Vec<User> = paginate(|cursor| self.user_page(&key.instance, cursor))
            .try_filter(|user| future::ready(user.name == key.name))
            .try_collect()
            .await?;
        single(matching, || format!("user {key}"))
    }

    // Cloud Files

    async fn container_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Container>, ProviderError> {
        let url = self.endpoint(SERVICE_FILES)?.to_string();
        let request = self
            .request(Method::GET, url)
            .query(&[("format", "json")])
            .query(&[("limit", PAGE_SIZE)])
            .query(&marker(&cursor));
        let listing: Vec<SwiftContainer> = self.get_json(request).await?;
        let full = listing.len() == PAGE_SIZE;
        let mut containers = Vec::with_capacity(listing.len());
        for entry in listing {
            let cdn = self.cdn_status(&entry.name).await?;
            containers.push(Container {
                name: entry.name,
                object_count: entry.count,
                bytes_used: entry.bytes,
                cdn_enabled: cdn.enabled,
                cdn_uri: cdn.uri,
                cdn_ttl: cdn.ttl,
            });
        }
        let next = containers
            .last()
            .filter(|_| full)
            .map(|container| container.name.clone());
        Ok(Page {
            items: containers,
            next,
        })
    }

    async fn container_by_name(&self, name: &str) -> Result<Container, ProviderError> {
        let url = self.endpoint_url(SERVICE_FILES, &[name])?;
        let response = self
            .send(self.request(Method::HEAD, url))
            .await
            .map_err(|err| match err {
                ProviderError::NotFound(_) => ProviderError::NotFound(format!("container {name}")),
                other => other,
            })?;
        let cdn = self.cdn_status(name).await?;
        Ok(Container {
            name: name.to_string(),
            object_count: header(&response, "X-Container-Object-Count").unwrap_or_default(),
            bytes_used: header(&response, "X-Container-Bytes-Used").unwrap_or_default(),
            cdn_enabled: cdn.enabled,
            cdn_uri: cdn.uri,
            cdn_ttl: cdn.ttl,
        })
    }

    async fn cdn_status(&self, name: &str) -> Result<CdnStatus, ProviderError> {
        let url = self.endpoint_url(SERVICE_CDN, &[name])?;
        let Some(response) = self.send(self.request(Method::HEAD, url)).await.optional()? else {
            return Ok(CdnStatus::default());
        };
        Ok(CdnStatus {
            enabled: header::<String>(&response, "X-Cdn-Enabled")
                .is_some_and(|enabled| enabled.eq_ignore_ascii_case("true")),
            uri: header(&response, "X-Cdn-Uri"),
            ttl: header(&response, "X-Ttl"),
        })
    }

    async fn apply_cdn(
        &self,
        name: &str,
        settings: &ContainerSettings,
        current: &CdnStatus,
    ) -> Result<(), ProviderError> {
        if settings.cdn_enabled.is_none() && settings.cdn_ttl.is_none() {
            return Ok(());
        }
        let enabling = settings.cdn_enabled == Some(true) && !current.enabled;
        let url = self.endpoint_url(SERVICE_CDN, &[name])?;
        let mut request = self.request(if enabling { Method::PUT } else { Method::POST }, url);
        if let Some(enabled) = settings.cdn_enabled {
            request = request.header("X-Cdn-Enabled", if enabled { "True" } else { "False" });
        }
        if let Some(ttl) = settings.cdn_ttl {
            request = request.header("X-Ttl", ttl.to_string());
        }
        self.send(request).await?;
        Ok(())
    }

    // Load balancers and images

    async fn load_balancer_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancer>, ProviderError> {
        let url = format!("{}/loadbalancers", self.endpoint(SERVICE_LOAD_BALANCERS)?);
        let request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE)])
            .query(&marker(&cursor));
        let list: ClbList = self.get_json(request).await?;
        let full = list.load_balancers.len() == PAGE_SIZE;
        let load_balancers: Vec<LoadBalancer> = list
            .load_balancers
            .into_iter()
            .map(|lb| LoadBalancer {
                id: lb.id.into(),
                name: lb.name,
                port: lb.port,
                protocol: lb.protocol,
                status: lb.status,
            })
            .collect();
        let next = load_balancers
            .last()
            .filter(|_| full)
            .map(|lb| lb.id.clone());
        Ok(Page {
            items: load_balancers,
            next,
        })
    }

    async fn load_balancer_by_name(&self, name: &str) -> Result<LoadBalancer, ProviderError> {
        let matching: Vec<LoadBalancer> = paginate(|cursor| self.load_balancer_page(cursor))
            .try_filter(|lb| future::ready(lb.name == name))
            .try_collect()
            .await?;
        single(matching, || format!("load balancer {name}"))
    }

    async fn image_page(&self, cursor: Option<String>) -> Result<Page<Image>, ProviderError> {
        let url = format!("{}/images/detail", self.endpoint(SERVICE_SERVERS)?);
        let request = self
            .request(Method::GET, url)
            .query(&[("limit", PAGE_SIZE)])
            .query(&marker(&cursor));
        let list: NovaImageList = self.get_json(request).await?;
        let full = list.images.len() == PAGE_SIZE;
        let images: Vec<Image> = list
            .images
            .into_iter()
            .map(|image| Image {
                id: image.id,
                name: image.name,
                status: image.status,
            })
            .collect();
        let next = images
            .last()
            .filter(|_| full)
            .map(|image| image.id.clone());
        Ok(Page {
            items: images,
            next,
        })
    }

    async fn image_by_name(&self, name: &str) -> Result<Image, ProviderError> {
        let matching: Vec<Image> = paginate(|cursor| self.image_page(cursor))
            .try_filter(|image| future::ready(image.name == name))
            .try_collect()
            .await?;
        single(matching, || format!("image {name}"))
    }
}

impl ZoneAccessor for Rackspace {
    async fn list_zones_page(&self, cursor: Option<String>) -> Result<Page<Zone>, ProviderError> {
        self.zone_page(cursor).await
    }

    async fn find_zone(&self, name: &str) -> Result<Zone, ProviderError> {
        self.zone_by_name(name).await
    }

    async fn create_zone(
        &self,
        name: &str,
        settings: &ZoneSettings,
    ) -> Result<Zone, ProviderError> {
        settings.validate_create()?;
        let url = format!("{}/domains", self.endpoint(SERVICE_DNS)?);
        let body = NewDnsDomains {
            domains: vec![NewDnsDomain {
                name,
                email_address: settings.email.as_deref().unwrap_or_default(),
                ttl: settings.ttl,
                comment: settings.comment.as_deref(),
            }],
        };
        let response = self
            .run_job(self.request(Method::POST, url).json(&body))
            .await?;
        let list: DnsDomainList = from_job_response(response)?;
        let domain = list
            .domains
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("DNS job returned no zone for {name}"))?;
        Ok(from_dns_domain(domain))
    }

    async fn update_zone(
        &self,
        name: &str,
        settings: &ZoneSettings,
    ) -> Result<Zone, ProviderError> {
        settings.validate_update()?;
        let id = self.zone_id(name).await?;
        let url = format!("{}/domains/{id}", self.endpoint(SERVICE_DNS)?);
        let body = DnsDomainUpdate {
            email_address: settings.email.as_deref(),
            ttl: settings.ttl,
            comment: settings.comment.as_deref(),
        };
        self.run_job(self.request(Method::PUT, url).json(&body))
            .await?;
        self.zone_by_name(name).await
    }

    async fn delete_zone(&self, name: &str) -> Result<(), ProviderError> {
        let id = self.zone_id(name).await?;
        let url = format!("{}/domains/{id}", self.endpoint(SERVICE_DNS)?);
        self.run_job(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl RecordAccessor for Rackspace {
    async fn list_records_page(
        &self,
        zone: &str,
        cursor: Option<String>,
    ) -> Result<Page<Record>, ProviderError> {
        let zone_id = self.zone_id(zone).await?;
        self.record_page(&zone_id, None, cursor).await
    }

    async fn find_records(&self, key: &RecordKey) -> Result<Vec<Record>, ProviderError> {
        let zone_id = self.zone_id(&key.zone).await?;
        paginate(|cursor| self.record_page(&zone_id, Some(key), cursor))
            .try_filter(|record| {
                future::ready(record.name == key.name && record.record_type == key.record_type)
            })
            .try_collect()
            .await
    }

    async fn create_record(
        &self,
        key: &RecordKey,
        settings: &RecordSettings,
    ) -> Result<Record, ProviderError> {
        settings.validate(key.record_type)?;
        let zone_id = self.zone_id(&key.zone).await?;
        let url = format!("{}/domains/{zone_id}/records", self.endpoint(SERVICE_DNS)?);
        let body = NewDnsRecords {
            records: vec![NewDnsRecord {
                name: &key.name,
                record_type: key.record_type,
                data: &settings.data,
                ttl: settings.create_ttl(),
                priority: settings.priority,
                comment: settings.comment.as_deref(),
            }],
        };
        let response = self
            .run_job(self.request(Method::POST, url).json(&body))
            .await?;
        let list: DnsRecordList = from_job_response(response)?;
        let record = list
            .records
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("DNS job returned no record for {key}"))?;
        from_dns_record(record)
    }

    async fn update_record(
        &self,
        zone: &str,
        id: &str,
        settings: &RecordSettings,
    ) -> Result<Record, ProviderError> {
        let zone_id = self.zone_id(zone).await?;
        let current = self.record_by_id(&zone_id, id).await?;
        settings.validate(current.record_type)?;
        let url = format!("{}/domains/{zone_id}/records/{id}", self.endpoint(SERVICE_DNS)?);
        let body = DnsRecordUpdate {
            data: &settings.data,
            ttl: settings.ttl,
            priority: settings.priority,
            comment: settings.comment.as_deref(),
        };
        self.run_job(self.request(Method::PUT, url).json(&body))
            .await?;
        self.record_by_id(&zone_id, id).await
    }

    async fn delete_record(&self, zone: &str, id: &str) -> Result<(), ProviderError> {
        let zone_id = self.zone_id(zone).await?;
        let url = format!("{}/domains/{zone_id}/records/{id}", self.endpoint(SERVICE_DNS)?);
        self.run_job(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl InstanceAccessor for Rackspace {
    async fn list_flavors(&self) -> Result<Vec<Flavor>, ProviderError> {
        self.flavors().await
    }

    async fn list_instances_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Instance>, ProviderError> {
        self.instance_page(cursor).await
    }

    async fn find_instance(&self, name: &str) -> Result<Instance, ProviderError> {
        self.instance_by_name(name).await
    }

    async fn create_instance(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<Instance, ProviderError> {
        settings.validate_create()?;
        let flavor = self
            .flavor_by_name(settings.flavor.as_deref().unwrap_or_default())
            .await?;
        let url = format!("{}/instances", self.endpoint(SERVICE_DATABASES)?);
        let body = json!({
            "instance": {
                "name": name,
                "flavorRef": flavor.id,
                "volume": { "size": settings.volume_size },
            }
        });
        let created: TroveInstanceEnvelope = self
            .get_json(self.request(Method::POST, url).json(&body))
            .await?;
        Ok(from_trove_instance(created.instance, &[flavor]))
    }

    async fn update_instance(
        &self,
        name: &str,
        settings: &InstanceSettings,
    ) -> Result<Instance, ProviderError> {
        settings.validate()?;
        let current = self.instance_by_name(name).await?;

        if let Some(size) = settings.volume_size {
            if size < current.volume_size {
                return Err(ProviderError::invalid(format!(
                    "volume of {name} can only grow beyond {} GB",
                    current.volume_size
                )));
            }
        }

        if let Some(flavor) = settings.flavor.as_deref().filter(|f| *f != current.flavor) {
            let flavor = self.flavor_by_name(flavor).await?;
            tracing::debug!("Resizing {} to flavor {}..", name, flavor.name);
            self.resize(&current.id, json!({ "flavorRef": flavor.id }))
                .await?;
        }

        if let Some(size) = settings.volume_size.filter(|s| *s != current.volume_size) {
            tracing::debug!("Resizing volume of {} to {} GB..", name, size);
            self.resize(&current.id, json!({ "volume": { "size": size } }))
                .await?;
        }

        self.instance_by_name(name).await
    }

    async fn delete_instance(&self, name: &str) -> Result<(), ProviderError> {
        let instance = self.instance_by_name(name).await?;
        let url = format!(
            "{}/instances/{}",
            self.endpoint(SERVICE_DATABASES)?,
            instance.id
        );
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl DatabaseAccessor for Rackspace {
    async fn list_databases_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<Database>, ProviderError> {
        self.database_page(instance, cursor).await
    }

    async fn find_database(&self, key: &DatabaseKey) -> Result<Database, ProviderError> {
        self.database_by_key(key).await
    }

    async fn create_database(
        &self,
        key: &DatabaseKey,
        settings: &DatabaseSettings,
    ) -> Result<Database, ProviderError> {
        let instance = self.instance_by_name(&key.instance).await?;
        let url = format!(
            "{}/instances/{}/databases",
            self.endpoint(SERVICE_DATABASES)?,
            instance.id
        );
        let body = json!({
            "databases": [TroveDatabase {
                name: key.name.clone(),
                character_set: settings.character_set.clone(),
                collate: settings.collate.clone(),
            }]
        });
        self.send(self.request(Method::POST, url).json(&body))
            .await?;
        self.database_by_key(key).await
    }

    async fn update_database(
        &self,
        key: &DatabaseKey,
        _settings: &DatabaseSettings,
    ) -> Result<Database, ProviderError> {
        Err(ProviderError::invalid(format!(
            "character set and collation of database {key} cannot be changed"
        )))
    }

    async fn delete_database(&self, key: &DatabaseKey) -> Result<(), ProviderError> {
        let instance = self.instance_by_name(&key.instance).await?;
        let url = self.endpoint_url(
            SERVICE_DATABASES,
            &["instances", instance.id.as_str(), "databases", key.name.as_str()],
        )?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl UserAccessor for Rackspace {
    async fn list_users_page(
        &self,
        instance: &str,
        cursor: Option<String>,
    ) -> Result<Page<User>, ProviderError> {
        self.user_page(instance, cursor).await
    }

    async fn find_user(&self, key: &UserKey) -> Result<User, ProviderError> {
        self.user_by_key(key).await
    }

    async fn create_user(
        &self,
        key: &UserKey,
        settings: &UserSettings,
    ) -> Result<User, ProviderError> {
        settings.validate_create()?;
        let instance = self.instance_by_name(&key.instance).await?;
        let url = format!(
            "{}/instances/{}/users",
            self.endpoint(SERVICE_DATABASES)?,
            instance.id
        );
        let body = json!({
            "users": [{
                "name": key.name,
                "password": settings.password,
                "host": settings.host_or_default(),
                "databases": database_refs(settings.databases.as_deref().unwrap_or_default()),
            }]
        });
        self.send(self.request(Method::POST, url).json(&body))
            .await?;
        self.user_by_key(key).await
    }

    async fn update_user(
        &self,
        key: &UserKey,
        settings: &UserSettings,
    ) -> Result<User, ProviderError> {
        settings.validate()?;
        let instance = self.instance_by_name(&key.instance).await?;
        let current = self.user_by_key(key).await?;
        let user = ["instances", instance.id.as_str(), "users", key.name.as_str()];

        let host = settings.host.as_deref().filter(|host| *host != current.host);
        if settings.password.is_some() || host.is_some() {
            let body = json!({
                "user": TroveUserUpdate {
                    password: settings.password.as_deref(),
                    host,
                }
            });
            let url = self.endpoint_url(SERVICE_DATABASES, &user)?;
            self.send(self.request(Method::PUT, url).json(&body))
                .await?;
        }

        if let Some(databases) = &settings.databases {
            let grant: Vec<&str> = databases
                .iter()
                .filter(|db| !current.databases.contains(db))
                .map(String::as_str)
                .collect();
            if !grant.is_empty() {
                let body = json!({ "databases": database_refs(&grant) });
                let mut path = user.to_vec();
                path.push("databases");
                let url = self.endpoint_url(SERVICE_DATABASES, &path)?;
                self.send(self.request(Method::PUT, url).json(&body))
                    .await?;
            }
            for revoked in current.databases.iter().filter(|db| !databases.contains(db)) {
                tracing::debug!("Revoking {} from user {}..", revoked, key);
                let mut path = user.to_vec();
                path.extend(["databases", revoked.as_str()]);
                let url = self.endpoint_url(SERVICE_DATABASES, &path)?;
                self.send(self.request(Method::DELETE, url)).await?;
            }
        }

        self.user_by_key(key).await
    }

    async fn delete_user(&self, key: &UserKey) -> Result<(), ProviderError> {
        let instance = self.instance_by_name(&key.instance).await?;
        let url = self.endpoint_url(
            SERVICE_DATABASES,
            &["instances", instance.id.as_str(), "users", key.name.as_str()],
        )?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl ContainerAccessor for Rackspace {
    async fn list_containers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<Container>, ProviderError> {
        self.container_page(cursor).await
    }

    async fn find_container(&self, name: &str) -> Result<Container, ProviderError> {
        self.container_by_name(name).await
    }

    async fn create_container(
        &self,
        name: &str,
        settings: &ContainerSettings,
    ) -> Result<Container, ProviderError> {
        settings.validate()?;
        let url = self.endpoint_url(SERVICE_FILES, &[name])?;
        self.send(self.request(Method::PUT, url)).await?;
        self.apply_cdn(name, settings, &CdnStatus::default()).await?;
        self.container_by_name(name).await
    }

    async fn update_container(
        &self,
        name: &str,
        settings: &ContainerSettings,
    ) -> Result<Container, ProviderError> {
        settings.validate()?;
        let current = self.cdn_status(name).await?;
        self.apply_cdn(name, settings, &current).await?;
        self.container_by_name(name).await
    }

    async fn delete_container(&self, name: &str) -> Result<(), ProviderError> {
        let url = self.endpoint_url(SERVICE_FILES, &[name])?;
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl LoadBalancerAccessor for Rackspace {
    async fn list_load_balancers_page(
        &self,
        cursor: Option<String>,
    ) -> Result<Page<LoadBalancer>, ProviderError> {
        self.load_balancer_page(cursor).await
    }

    async fn find_load_balancer(&self, name: &str) -> Result<LoadBalancer, ProviderError> {
        self.load_balancer_by_name(name).await
    }

    async fn delete_load_balancer(&self, name: &str) -> Result<(), ProviderError> {
        let lb = self.load_balancer_by_name(name).await?;
        let url = format!(
            "{}/loadbalancers/{}",
            self.endpoint(SERVICE_LOAD_BALANCERS)?,
            lb.id
        );
        self.send(self.request(Method::DELETE, url)).await?;
        Ok(())
    }
}

impl ImageAccessor for Rackspace {
    async fn list_images_page(&self, cursor: Option<String>) -> Result<Page<Image>, ProviderError> {
        self.image_page(cursor).await
    }

    async fn find_image(&self, name: &str) -> Result<Image, ProviderError> {
        self.image_by_name(name).await
    }
}

fn transport(err: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(err.to_string())
}

fn decode(err: reqwest::Error) -> ProviderError {
    ProviderError::Other(err.into())
}

async fn check(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    let message = error_message(status, body);
    match status {
        StatusCode::BAD_REQUEST => ProviderError::InvalidArgument(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            ProviderError::AuthenticationFailed(message)
        }
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::CONFLICT => ProviderError::DuplicateMatch(message),
        StatusCode::PAYLOAD_TOO_LARGE => ProviderError::Unavailable(message),
        status if status.is_server_error() => ProviderError::Unavailable(message),
        _ => ProviderError::Other(anyhow!(message)),
    }
}

/// Rackspace faults come either flat (`{"message": ..}`) or wrapped in a
/// single named fault (`{"badRequest": {"message": ..}}`).
fn error_message(status: StatusCode, body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = parsed
        .as_ref()
        .and_then(|value| {
            value
                .get("message")
                .or_else(|| value.as_object()?.values().next()?.get("message"))
        })
        .and_then(serde_json::Value::as_str);
    match message {
        Some(message) => format!("{status}: {message}"),
        None if !body.trim().is_empty() => format!("{status}: {}", body.trim()),
        None => status.to_string(),
    }
}

fn job_error(error: Option<DnsJobError>) -> ProviderError {
    let Some(error) = error else {
        return ProviderError::Other(anyhow!("DNS job failed without details"));
    };
    let message = match &error.details {
        Some(details) => format!("{}: {details}", error.message),
        None => error.message.clone(),
    };
    match error.code.and_then(|code| StatusCode::from_u16(code).ok()) {
        Some(status) => status_error(status, &json!({ "message": message }).to_string()),
        None => ProviderError::Other(anyhow!(message)),
    }
}

fn from_job_response<T: DeserializeOwned>(
    response: Option<serde_json::Value>,
) -> Result<T, ProviderError> {
    let response = response.ok_or_else(|| anyhow!("DNS job finished without a response"))?;
    serde_json::from_value(response).map_err(|e| ProviderError::Other(e.into()))
}

fn resolve_endpoints(catalog: &[CatalogEntry], region: &str) -> BTreeMap<String, String> {
    catalog
        .iter()
        .filter_map(|entry| {
            let regional = entry.endpoints.iter().find(|endpoint| {
                endpoint
                    .region
                    .as_deref()
                    .is_some_and(|r| r.eq_ignore_ascii_case(region))
            });
            let global = entry
                .endpoints
                .iter()
                .find(|endpoint| endpoint.region.is_none());
            regional
                .or(global)
                .map(|endpoint| (entry.name.clone(), endpoint.public_url.clone()))
        })
        .collect()
}

fn segment_url(base: &str, segments: &[&str]) -> Result<Url, ProviderError> {
    let mut url = Url::parse(base).map_err(|e| anyhow!("invalid endpoint {base}: {e}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow!("endpoint {base} cannot take a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

fn parse_offset(cursor: Option<String>) -> Result<usize, ProviderError> {
    match cursor {
        Some(cursor) => cursor
            .parse()
            .map_err(|_| ProviderError::invalid(format!("bad page offset {cursor:?}"))),
        None => Ok(0),
    }
}

fn offset_page<T>(items: Vec<T>, offset: usize, total: Option<usize>) -> Page<T> {
    let seen = offset + items.len();
    let more = match total {
        Some(total) => seen < total,
        None => items.len() == PAGE_SIZE,
    };
    let next = (more && !items.is_empty()).then(|| seen.to_string());
    Page { items, next }
}

fn marker(cursor: &Option<String>) -> Vec<(&'static str, String)> {
    cursor
        .iter()
        .map(|marker| ("marker", marker.clone()))
        .collect()
}

fn single<T>(mut items: Vec<T>, what: impl Fn() -> String) -> Result<T, ProviderError> {
    match items.len() {
        0 => Err(ProviderError::NotFound(what())),
        1 => Ok(items.remove(0)),
        n => Err(ProviderError::DuplicateMatch(format!("{n} matches for {}", what()))),
    }
}

fn header<T: FromStr>(response: &Response, name: &str) -> Option<T> {
    response.headers().get(name)?.to_str().ok()?.parse().ok()
}

fn database_refs<S: AsRef<str>>(names: &[S]) -> Vec<serde_json::Value> {
    names
        .iter()
        .map(|name| json!({ "name": name.as_ref() }))
        .collect()
}

fn from_dns_domain(domain: DnsDomain) -> Zone {
    Zone {
        id: domain.id.into(),
        name: domain.name,
        email: domain.email_address,
        ttl: domain.ttl,
        nameservers: domain.nameservers.into_iter().map(|ns| ns.name).collect(),
        comment: domain.comment,
    }
}

fn from_dns_record(record: DnsRecord) -> Result<Record, ProviderError> {
    let record_type = record.record_type.parse().map_err(|_| {
        ProviderError::invalid(format!(
            "record {} has unsupported type {}",
            record.name, record.record_type
        ))
    })?;
    Ok(Record {
        id: record.id.into(),
        name: record.name,
        record_type,
        data: record.data,
        ttl: record.ttl,
        priority: record.priority,
        comment: record.comment,
    })
}

/// Records of types this crate does not model are skipped so that one of
/// them cannot hide the rest of the zone.
fn from_dns_records(records: Vec<DnsRecord>) -> Vec<Record> {
    records
        .into_iter()
        .filter_map(|record| match from_dns_record(record) {
            Ok(record) => Some(record),
            Err(err) => {
                tracing::warn!("Skipping record: {}", err);
                None
            }
        })
        .collect()
}

fn from_trove_instance(instance: TroveInstance, flavors: &[Flavor]) -> Instance {
    let flavor_id: String = instance.flavor.id.into();
    let flavor = flavors
        .iter()
        .find(|flavor| flavor.id == flavor_id)
        .map_or(flavor_id, |flavor| flavor.name.clone());
    Instance {
        id: instance.id,
        name: instance.name,
        status: instance.status,
        flavor,
        volume_size: instance.volume.size,
        hostname: instance.hostname,
    }
}

fn from_trove_user(user: TroveUser) -> User {
    User {
        name: user.name,
        host: user.host.unwrap_or_else(|| "%".to_string()),
        databases: user.databases.into_iter().map(|db| db.name).collect(),
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ApiId {
    Number(u64),
    Text(String),
}

impl From<ApiId> for String {
    fn from(id: ApiId) -> Self {
        match id {
            ApiId::Number(id) => id.to_string(),
            ApiId::Text(id) => id,
        }
    }
}

#[derive(Default)]
struct CdnStatus {
    enabled: bool,
    uri: Option<String>,
    ttl: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct IdentityResponse {
    access: IdentityAccess,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityAccess {
    token: IdentityToken,
    service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct IdentityToken {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    name: String,
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    #[serde(default)]
    region: Option<String>,
    #[serde(rename = "publicURL")]
    public_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsJob {
    status: String,
    callback_url: String,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<DnsJobError>,
}

#[derive(Debug, Deserialize)]
struct DnsJobError {
    #[serde(default)]
    code: Option<u16>,
    message: String,
    #[serde(default)]
    details: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsDomainList {
    #[serde(default)]
    domains: Vec<DnsDomain>,
    #[serde(default)]
    total_entries: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsDomain {
    id: ApiId,
    name: String,
    email_address: String,
    ttl: u32,
    #[serde(default)]
    nameservers: Vec<DnsNameserver>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DnsNameserver {
    name: String,
}

#[derive(Serialize)]
struct NewDnsDomains<'a> {
    domains: Vec<NewDnsDomain<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewDnsDomain<'a> {
    name: &'a str,
    email_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DnsDomainUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    email_address: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DnsRecordList {
    #[serde(default)]
    records: Vec<DnsRecord>,
    #[serde(default)]
    total_entries: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct DnsRecord {
    id: ApiId,
    name: String,
    #[serde(rename = "type")]
    record_type: String,
    data: String,
    ttl: u32,
    #[serde(default)]
    priority: Option<u16>,
    #[serde(default)]
    comment: Option<String>,
}

#[derive(Serialize)]
struct NewDnsRecords<'a> {
    records: Vec<NewDnsRecord<'a>>,
}

#[derive(Serialize)]
struct NewDnsRecord<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    record_type: RecordType,
    data: &'a str,
    ttl: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Serialize)]
struct DnsRecordUpdate<'a> {
    data: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    priority: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct TroveLink {
    rel: String,
}

#[derive(Debug, Deserialize)]
struct TroveFlavorList {
    flavors: Vec<TroveFlavor>,
}

#[derive(Debug, Deserialize)]
struct TroveFlavor {
    id: ApiId,
    name: String,
    ram: u32,
}

#[derive(Debug, Deserialize)]
struct TroveInstanceList {
    instances: Vec<TroveInstance>,
    #[serde(default)]
    links: Vec<TroveLink>,
}

#[derive(Debug, Deserialize)]
struct TroveInstanceEnvelope {
    instance: TroveInstance,
}

#[derive(Debug, Deserialize)]
struct TroveInstance {
    id: String,
    name: String,
    status: String,
    flavor: TroveFlavorRef,
    volume: TroveVolume,
    #[serde(default)]
    hostname: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TroveFlavorRef {
    id: ApiId,
}

#[derive(Debug, Deserialize)]
struct TroveVolume {
    size: u32,
}

#[derive(Debug, Deserialize)]
struct TroveDatabaseList {
    databases: Vec<TroveDatabase>,
    #[serde(default)]
    links: Vec<TroveLink>,
}

#[derive(Debug, Deserialize, Serialize)]
struct TroveDatabase {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    character_set: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    collate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TroveUserList {
    users: Vec<TroveUser>,
    #[serde(default)]
    links: Vec<TroveLink>,
}

#[derive(Debug, Deserialize)]
struct TroveUser {
    name: String,
    #[serde(default)]
    host: Option<String>,
    #[serde(default)]
    databases: Vec<TroveDatabaseRef>,
}

#[derive(Debug, Deserialize)]
struct TroveDatabaseRef {
    name: String,
}

#[derive(Serialize)]
struct TroveUserUpdate<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SwiftContainer {
    name: String,
    count: u64,
    bytes: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClbList {
    load_balancers: Vec<ClbLoadBalancer>,
}

#[derive(Debug, Deserialize)]
struct ClbLoadBalancer {
    id: ApiId,
    name: String,
    port: u16,
    protocol: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct NovaImageList {
    images: Vec<NovaImage>,
}

#[derive(Debug, Deserialize)]
struct NovaImage {
    id: String,
    name: String,
    status: String,
}

#[cfg(test)]
mod tests {
    use cloud_ensure::accessor::{RecordAccessor, ZoneAccessor};
    use cloud_ensure::model::{RecordKey, RecordSettings, ZoneSettings};
    use serde_json::json;

    use super::*;

    const TEST_ZONE: &str = "cloud-ensure-test-123.com";

    #[test]
    fn domain_payload_maps_to_zone() {
        let domain: DnsDomain = serde_json::from_value(json!({
            "id": 2725233,
            "name": "example.com",
            "emailAddress": "admin@example.com",
            "ttl": 600,
            "nameservers": [
                { "name": "dns1.stabletransit.com" },
                { "name": "dns2.stabletransit.com" }
            ],
            "updated": "2011-06-24T01:23:15.000+0000"
        }))
        .unwrap();
        let zone = from_dns_domain(domain);
        assert_eq!(zone.id, "2725233");
        assert_eq!(zone.email, "admin@example.com");
        assert_eq!(zone.nameservers.len(), 2);
        assert_eq!(zone.comment, None);
    }

    #[test]
    fn record_payload_maps_to_record() {
        let record: DnsRecord = serde_json::from_value(json!({
            "id": "MX-4582",
            "name": "example.com",
            "type": "MX",
            "data": "mail.example.com",
            "ttl": 3600,
            "priority": 5
        }))
        .unwrap();
        let record = from_dns_record(record).unwrap();
        assert_eq!(record.id, "MX-4582");
        assert_eq!(record.record_type, RecordType::MX);
        assert_eq!(record.priority, Some(5));
    }

    #[test]
    fn new_record_omits_missing_priority() {
        let body = serde_json::to_value(NewDnsRecord {
            name: "www.example.com",
            record_type: RecordType::A,
            data: "192.0.2.10",
            ttl: 600,
            priority: None,
            comment: None,
        })
        .unwrap();
        assert_eq!(
            body,
            json!({ "name": "www.example.com", "type": "A", "data": "192.0.2.10", "ttl": 600 })
        );
    }

    #[test]
    fn instance_flavor_is_named() {
        let instance: TroveInstance = serde_json::from_value(json!({
            "id": "d4603f69-ec7e-4e9b-803f-600b9205576f",
            "name": "db1",
            "status": "ACTIVE",
            "flavor": { "id": "1", "links": [] },
            "volume": { "size": 2 },
            "hostname": "e09ad9a3f73309469cf1f43d11e79549caf9acf2.rackspaceclouddb.com"
        }))
        .unwrap();
        let flavors = vec![Flavor {
            id: "1".to_string(),
            name: "512MB Instance".to_string(),
            ram: 512,
        }];
        let instance = from_trove_instance(instance, &flavors);
        assert_eq!(instance.flavor, "512MB Instance");
        assert_eq!(instance.volume_size, 2);
    }

    #[test]
    fn user_without_host_defaults_to_wildcard() {
        let user: TroveUser = serde_json::from_value(json!({
            "name": "app",
            "databases": [{ "name": "app" }, { "name": "reports" }]
        }))
        .unwrap();
        let user = from_trove_user(user);
        assert_eq!(user.host, "%");
        assert_eq!(user.databases, vec!["app", "reports"]);
    }

    #[test]
    fn fault_messages_are_unwrapped() {
        let err = status_error(
            StatusCode::BAD_REQUEST,
            r#"{"badRequest": {"code": 400, "message": "Invalid volume size"}}"#,
        );
        assert!(
            matches!(err, ProviderError::InvalidArgument(m) if m.contains("Invalid volume size"))
        );

        let err = status_error(StatusCode::NOT_FOUND, "");
        assert!(err.is_not_found());

        let err = status_error(StatusCode::SERVICE_UNAVAILABLE, "maintenance");
        assert!(matches!(err, ProviderError::Unavailable(m) if m.contains("maintenance")));

        let err = status_error(
            StatusCode::UNAUTHORIZED,
            r#"{"unauthorized": {"message": "Bad key"}}"#,
        );
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
    }

    #[test]
    fn failed_jobs_keep_their_status() {
        let err = job_error(Some(DnsJobError {
            code: Some(409),
            message: "Conflict".to_string(),
            details: Some("Domain already exists".to_string()),
        }));
        assert!(
            matches!(err, ProviderError::DuplicateMatch(m) if m.contains("Domain already exists"))
        );
    }

    #[test]
    fn offset_pages_stop_at_total() {
        let page = offset_page(vec![1, 2, 3], 0, Some(5));
        assert_eq!(page.next.as_deref(), Some("3"));
        let page = offset_page(vec![4, 5], 3, Some(5));
        assert_eq!(page.next, None);
        let page = offset_page(Vec::<u32>::new(), 0, None);
        assert_eq!(page.next, None);
    }

    #[test]
    fn endpoints_prefer_region_then_global() {
        let catalog: Vec<CatalogEntry> = serde_json::from_value(json!([
            {
                "name": "cloudDNS",
                "endpoints": [{ "publicURL": "https://dns.api.rackspacecloud.com/v1.0/123" }]
            },
            {
                "name": "cloudDatabases",
                "endpoints": [
                    {
                        "region": "DFW",
                        "publicURL": "https://dfw.databases.api.rackspacecloud.com/v1.0/123"
                    },
                    {
                        "region": "ORD",
                        "publicURL": "https://ord.databases.api.rackspacecloud.com/v1.0/123"
                    }
                ]
            },
            {
                "name": "cloudFiles",
                "endpoints": [{
                    "region": "SYD",
                    "publicURL": "https://storage101.syd2.clouddrive.com/v1/123"
                }]
            }
        ]))
        .unwrap();

        let endpoints = resolve_endpoints(&catalog, "ord");
        assert_eq!(
            endpoints.get(SERVICE_DATABASES).map(String::as_str),
            Some("https://ord.databases.api.rackspacecloud.com/v1.0/123")
        );
        assert!(endpoints.contains_key(SERVICE_DNS));
        assert!(!endpoints.contains_key(SERVICE_FILES));
    }

    #[test]
    fn single_match_is_required() {
        assert!(single(Vec::<u32>::new(), || "x".to_string()).unwrap_err().is_not_found());
        assert!(matches!(
            single(vec![1, 2], || "x".to_string()),
            Err(ProviderError::DuplicateMatch(_))
        ));
        assert_eq!(single(vec![7], || "x".to_string()).unwrap(), 7);
    }

    #[test]
    fn unsupported_record_types_are_skipped() {
        let records: Vec<DnsRecord> = serde_json::from_value(json!([
            { "id": "A-1", "name": "www.example.com", "type": "A", "data": "192.0.2.1", "ttl": 60 },
            { "id": "SPF-2", "name": "example.com", "type": "SPF", "data": "v=spf1", "ttl": 60 },
            { "id": "TXT-3", "name": "example.com", "type": "TXT", "data": "hello", "ttl": 60 }
        ]))
        .unwrap();

        let records = from_dns_records(records);

        let ids: Vec<_> = records.iter().map(|record| record.id.as_str()).collect();
        assert_eq!(ids, vec!["A-1", "TXT-3"]);
    }

    #[test]
    fn single_unsupported_record_is_invalid() {
        let record: DnsRecord = serde_json::from_value(json!({
            "id": "SPF-2", "name": "example.com", "type": "SPF", "data": "v=spf1", "ttl": 600
        }))
        .unwrap();
        assert!(matches!(
            from_dns_record(record),
            Err(ProviderError::InvalidArgument(_))
        ));
    }

    #[test]
    fn path_segments_are_percent_encoded() {
        let url = segment_url(
            "https://storage101.ord1.clouddrive.com/v1/MossoCloudFS_123",
            &["logs?2024#q1"],
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://storage101.ord1.clouddrive.com/v1/MossoCloudFS_123/logs%3F2024%23q1"
        );
        assert_eq!(url.query(), None);

        let url = segment_url(
            "https://ord.databases.api.rackspacecloud.com/v1.0/123/",
            &["instances", "abc", "users", "app user"],
        )
        .unwrap();
        assert_eq!(url.path(), "/v1.0/123/instances/abc/users/app%20user");
    }

    #[test]
    fn poll_interval_is_a_duration() {
        let settings: RackspaceSettings = serde_json::from_value(json!({
            "RACKSPACE_USERNAME": "user",
            "RACKSPACE_API_KEY": "key",
            "RACKSPACE_REGION": "ORD",
            "RACKSPACE_JOB_POLL_INTERVAL": "500ms"
        }))
        .unwrap();
        assert_eq!(settings.job_poll_interval, Some(Duration::from_millis(500)));
        assert_eq!(settings.identity_url, DEFAULT_IDENTITY_URL);

        let settings: RackspaceSettings = serde_json::from_value(json!({
            "RACKSPACE_USERNAME": "user",
            "RACKSPACE_API_KEY": "key",
            "RACKSPACE_REGION": "ORD"
        }))
        .unwrap();
        assert_eq!(settings.job_poll_interval, None);
    }

    #[tokio::test]
    #[ignore]
    async fn create_zone() {
        let provider = Rackspace::connect(de_env::from_env().unwrap()).await.unwrap();
        let settings = ZoneSettings {
            email: Some(format!("hostmaster@{TEST_ZONE}")),
            ttl: Some(600),
            comment: None,
        };
        let zone = provider.create_zone(TEST_ZONE, &settings).await.unwrap();
        assert!(!zone.id.is_empty());
        assert_eq!(zone.ttl, 600);
    }

    #[tokio::test]
    #[ignore]
    async fn find_zone() {
        let provider = Rackspace::connect(de_env::from_env().unwrap()).await.unwrap();
        let zone = provider.find_zone(TEST_ZONE).await.unwrap();
        assert_eq!(zone.name, TEST_ZONE);
    }

    #[tokio::test]
    #[ignore]
    async fn create_record() {
        let provider = Rackspace::connect(de_env::from_env().unwrap()).await.unwrap();
        let key = RecordKey::new(TEST_ZONE, format!("www.{TEST_ZONE}"), "A").unwrap();
        let record = provider
            .create_record(&key, &RecordSettings::new("192.0.2.10"))
            .await
            .unwrap();
        assert_eq!(record.data, "192.0.2.10");
    }

    #[tokio::test]
    #[ignore]
    async fn delete_zone() {
        let provider = Rackspace::connect(de_env::from_env().unwrap()).await.unwrap();
        provider.delete_zone(TEST_ZONE).await.unwrap();
    }
}
