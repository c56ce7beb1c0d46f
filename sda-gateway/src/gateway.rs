//! Operator intents turned into ordered manager calls, reconciled against the
//! local registry.
//!
//! Live facts (application state, service counts) always come from the
//! manager; the registry only contributes what the manager does not track.
//! Multi-step operations abort on the first failure and never roll back side
//! effects that already happened upstream.

use std::{collections::HashSet, sync::Arc};

use sdam::{AgentDetail, AppAction, SdamClient, host_only};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::{
    error::GatewayError,
    logging::{category_selection, category_upstream},
    registry::{ApplicationRegistryEntry, LocalRegistry, TemplateRegistry},
    selection::{DeviceSelection, Selection},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub id: String,
    pub host: String,
    pub port: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppSummary {
    pub id: String,
    pub services: usize,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppListing {
    pub device: String,
    pub apps: Vec<AppSummary>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub pruned: Vec<String>,
    pub kept: usize,
}

#[derive(Clone)]
pub struct Gateway {
    selection: Arc<RwLock<Selection>>,
    upstream: SdamClient,
    registry: LocalRegistry,
}

impl Gateway {
    pub fn with_selection(
        upstream: SdamClient,
        registry: LocalRegistry,
        selection: Selection,
    ) -> Self {
        Self {
            selection: Arc::new(RwLock::new(selection)),
            upstream,
            registry,
        }
    }

    pub fn registry(&self) -> &LocalRegistry {
        &self.registry
    }

    pub async fn selection(&self) -> Selection {
        self.selection.read().await.clone()
    }

    pub async fn set_manager(&self, address: String) -> String {
        info!("{} manager address set to {address}", category_selection());
        self.selection.write().await.set_manager(address.clone());
        address
    }

    pub async fn manager(&self) -> Result<String, GatewayError> {
        Ok(self.selection.read().await.manager()?.to_string())
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceSummary>, GatewayError> {
        let target = self.selection.read().await.manager_target()?;
        let agents = self.upstream.list_agents(&target.manager).await?;
        Ok(agents
            .into_iter()
            .map(|agent| DeviceSummary {
                id: agent.id,
                host: agent.host,
                port: agent.port,
            })
            .collect())
    }

    pub async fn select_device(&self, device: DeviceSelection) -> Result<(), GatewayError> {
        for (field, value) in [
            ("id", &device.id),
            ("host", &device.host),
            ("port", &device.port),
        ] {
            if value.trim().is_empty() {
                return Err(GatewayError::bad_request(format!(
                    "device {field} is required"
                )));
            }
        }
        let summary = format!("id={} host={} port={}", device.id, device.host, device.port);
        self.selection.write().await.select_device(device)?;
        info!("{} device selected {summary}", category_selection());
        Ok(())
    }

    pub async fn selected_device_detail(&self) -> Result<AgentDetail, GatewayError> {
        let target = self.selection.read().await.device_target()?;
        Ok(self
            .upstream
            .get_agent(&target.manager, &target.device.id)
            .await?)
    }

    /// One listing call plus one detail call per application; the first
    /// failing call fails the whole listing.
    pub async fn list_applications(&self) -> Result<AppListing, GatewayError> {
        let target = self.selection.read().await.device_target()?;
        let app_ids = self
            .upstream
            .list_applications(&target.manager, &target.device.id)
            .await?;
        let registry = self.registry.applications()?;

        let mut apps = Vec::with_capacity(app_ids.len());
        for app_id in app_ids {
            let app = self
                .upstream
                .get_application(&target.manager, &target.device.id, &app_id)
                .await?;
            apps.push(AppSummary {
                name: registry.name_of(&app.id).map(str::to_string),
                id: app.id,
                services: app.service_count,
                state: app.state,
            });
        }

        Ok(AppListing {
            device: format!(
                "IP: {}, PORT: {}",
                target.device.host, target.device.port
            ),
            apps,
        })
    }

    pub async fn select_application(&self, app_id: String) -> Result<(), GatewayError> {
        if app_id.trim().is_empty() {
            return Err(GatewayError::bad_request("application id is required"));
        }
        self.selection.write().await.select_application(app_id.clone())?;
        info!("{} application selected id={app_id}", category_selection());
        Ok(())
    }

    pub async fn delete_application(&self) -> Result<(), GatewayError> {
        let target = self.selection.read().await.app_target()?;
        self.upstream
            .delete_application(&target.manager, &target.device.id, &target.app_id)
            .await?;
        let cleared = self
            .selection
            .write()
            .await
            .clear_application_if(&target.device.id, &target.app_id);
        info!(
            "{} application deleted device={} app={} selection_cleared={cleared}",
            category_upstream(),
            target.device.id,
            target.app_id
        );
        Ok(())
    }

    /// Deploys upstream, then records the name locally. A failed local write
    /// after a successful deploy leaves the application installed but unnamed.
    pub async fn install_application(
        &self,
        name: String,
        payload: String,
    ) -> Result<String, GatewayError> {
        let target = self.selection.read().await.device_target()?;
        let app_id = self
            .upstream
            .deploy_application(&target.manager, &target.device.id, payload)
            .await?;
        info!(
            "{} application deployed device={} app={app_id}",
            category_upstream(),
            target.device.id
        );

        let entry = ApplicationRegistryEntry {
            id: app_id.clone(),
            name,
            device: Some(target.device.id.clone()),
        };
        if let Err(err) = self.registry.record_application(entry).await {
            warn!(
                "{} application {app_id} is installed on device {} but could not be named locally: {err}",
                category_upstream(),
                target.device.id
            );
            return Err(err);
        }
        Ok(app_id)
    }

    pub async fn app_action(&self, action: AppAction) -> Result<(), GatewayError> {
        let target = self.selection.read().await.app_target()?;
        self.upstream
            .app_action(&target.manager, &target.device.id, &target.app_id, action)
            .await?;
        info!(
            "{} application {} device={} app={}",
            category_upstream(),
            action.as_str(),
            target.device.id,
            target.app_id
        );
        Ok(())
    }

    /// The selected application's configuration document, `{}` when the
    /// manager has none.
    pub async fn application_document(&self) -> Result<Value, GatewayError> {
        let target = self.selection.read().await.app_target()?;
        let document = self
            .upstream
            .get_configuration_document(&target.manager, &target.device.id, &target.app_id)
            .await?;
        Ok(document.unwrap_or_else(|| Value::Object(Default::default())))
    }

    pub async fn set_application_document(&self, payload: String) -> Result<(), GatewayError> {
        let target = self.selection.read().await.app_target()?;
        self.upstream
            .set_configuration_document(&target.manager, &target.device.id, &target.app_id, payload)
            .await?;
        Ok(())
    }

    pub fn templates(&self) -> Result<TemplateRegistry, GatewayError> {
        self.registry.templates()
    }

    pub async fn append_template(&self, template: Value) -> Result<(), GatewayError> {
        self.registry.append_template(template).await?;
        Ok(())
    }

    /// Asks the agent at `agent_address` to register with the configured
    /// manager, advertised by host only.
    pub async fn register_device(
        &self,
        agent_address: String,
        interval: String,
    ) -> Result<(), GatewayError> {
        if agent_address.trim().is_empty() {
            return Err(GatewayError::bad_request("agent address is required"));
        }
        let target = self.selection.read().await.manager_target()?;
        let manager_host = host_only(&target.manager);
        self.upstream
            .register_device(&agent_address, manager_host, &interval)
            .await?;
        info!(
            "{} agent {agent_address} asked to register with manager {manager_host}",
            category_upstream()
        );
        Ok(())
    }

    /// Unlike registration, this targets the selected device itself.
    pub async fn unregister_device(&self) -> Result<(), GatewayError> {
        let device = self.selection.read().await.device()?.clone();
        self.upstream
            .unregister_device(&device.host, &device.port)
            .await?;
        info!(
            "{} device {} unregistered at {}:{}",
            category_upstream(),
            device.id,
            device.host,
            device.port
        );
        Ok(())
    }

    /// Prunes registry entries recorded for the selected device that the
    /// manager no longer lists.
    pub async fn reconcile_applications(&self) -> Result<ReconcileReport, GatewayError> {
        let target = self.selection.read().await.device_target()?;
        let live_ids = self
            .upstream
            .list_applications(&target.manager, &target.device.id)
            .await?
            .into_iter()
            .collect::<HashSet<_>>();
        let pruned = self
            .registry
            .prune_applications(&target.device.id, &live_ids)
            .await?;
        let kept = self.registry.applications()?.apps.len();
        Ok(ReconcileReport { pruned, kept })
    }
}
