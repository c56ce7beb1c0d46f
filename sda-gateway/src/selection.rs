//! The operator's current target: manager, device and application.
//!
//! `Selection` is a single value with explicit transitions. Operations do not
//! read it field by field; they take an owned target snapshot once and carry it
//! through every upstream call they make.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionSlot {
    Manager,
    Device,
    Application,
}

impl fmt::Display for SelectionSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionSlot::Manager => f.write_str("manager address"),
            SelectionSlot::Device => f.write_str("device selection"),
            SelectionSlot::Application => f.write_str("application selection"),
        }
    }
}

/// A read of selection state that was never set.
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("{0} is not configured")]
pub struct NotConfigured(pub SelectionSlot);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPhase {
    Unconfigured,
    ManagerSet,
    DeviceSelected,
    ApplicationSelected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub id: String,
    pub host: String,
    pub port: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Selection {
    #[serde(skip_serializing_if = "Option::is_none")]
    manager: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    device: Option<DeviceSelection>,
    #[serde(rename = "app", skip_serializing_if = "Option::is_none")]
    application: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManagerTarget {
    pub manager: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceTarget {
    pub manager: String,
    pub device: DeviceSelection,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppTarget {
    pub manager: String,
    pub device: DeviceSelection,
    pub app_id: String,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// There is no way back to an unset manager once one has been set.
    pub fn set_manager(&mut self, address: impl Into<String>) {
        self.manager = Some(address.into());
    }

    pub fn manager(&self) -> Result<&str, NotConfigured> {
        self.manager
            .as_deref()
            .ok_or(NotConfigured(SelectionSlot::Manager))
    }

    /// Selecting any device, even the current one, drops the application.
    /// A device can only be chosen once a manager is set.
    pub fn select_device(&mut self, device: DeviceSelection) -> Result<(), NotConfigured> {
        self.manager()?;
        self.device = Some(device);
        self.application = None;
        Ok(())
    }

    pub fn device(&self) -> Result<&DeviceSelection, NotConfigured> {
        self.device
            .as_ref()
            .ok_or(NotConfigured(SelectionSlot::Device))
    }

    pub fn select_application(&mut self, app_id: impl Into<String>) -> Result<(), NotConfigured> {
        self.device()?;
        self.application = Some(app_id.into());
        Ok(())
    }

    pub fn application(&self) -> Result<&str, NotConfigured> {
        self.application
            .as_deref()
            .ok_or(NotConfigured(SelectionSlot::Application))
    }

    /// Clears the application only while it still names `app_id` on `device_id`.
    pub fn clear_application_if(&mut self, device_id: &str, app_id: &str) -> bool {
        let matches = self.device.as_ref().map(|device| device.id.as_str()) == Some(device_id)
            && self.application.as_deref() == Some(app_id);
        if matches {
            self.application = None;
        }
        matches
    }

    pub fn phase(&self) -> SelectionPhase {
        if self.application.is_some() {
            SelectionPhase::ApplicationSelected
        } else if self.device.is_some() {
            SelectionPhase::DeviceSelected
        } else if self.manager.is_some() {
            SelectionPhase::ManagerSet
        } else {
            SelectionPhase::Unconfigured
        }
    }

    pub fn manager_target(&self) -> Result<ManagerTarget, NotConfigured> {
        Ok(ManagerTarget {
            manager: self.manager()?.to_string(),
        })
    }

    pub fn device_target(&self) -> Result<DeviceTarget, NotConfigured> {
        Ok(DeviceTarget {
            manager: self.manager()?.to_string(),
            device: self.device()?.clone(),
        })
    }

    pub fn app_target(&self) -> Result<AppTarget, NotConfigured> {
        Ok(AppTarget {
            manager: self.manager()?.to_string(),
            device: self.device()?.clone(),
            app_id: self.application()?.to_string(),
        })
    }
}
