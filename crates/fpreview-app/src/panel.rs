//! Emulator panel bridge
//!
//! Host-side state of the device-frame UI: orientation, selected device and
//! the reaction to every [`PanelMessage`]. Work that needs the process
//! controller is returned as a [`PanelAction`] for the engine to carry out.

use std::sync::Arc;

use crate::config::{DevicePreset, Settings};
use crate::display::{DisplayMessage, DisplaySurface, Notification, PanelMessage};
use fpreview_core::prelude::*;

const EXPERIMENTAL_HOT_RELOAD_WARNING: &str = "The \"experimentalHotReload\" setting is deprecated and ignored as hot reload is enabled by default.";

/// Follow-up work requested by the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    /// Start the dev server with these extra flags
    StartServer { custom_flags: Vec<String> },
    /// Hot reload right away
    HotReload,
}

pub struct EmulatorPanel {
    display: Arc<dyn DisplaySurface>,
    is_portrait: bool,
    device_name: String,
    device: DevicePreset,
    server_url: Option<String>,
}

impl EmulatorPanel {
    pub fn new(display: Arc<dyn DisplaySurface>, settings: &Settings) -> Self {
        Self {
            display,
            is_portrait: true,
            device_name: settings.default_device.clone(),
            device: settings.default_device_preset(),
            server_url: None,
        }
    }

    pub fn handle(&mut self, message: PanelMessage, settings: &Settings) -> Option<PanelAction> {
        debug!("Received panel message: {:?}", message);

        match message {
            PanelMessage::WebviewReady => {
                if settings.experimental_hot_reload {
                    self.display
                        .notify(Notification::warning(EXPERIMENTAL_HOT_RELOAD_WARNING));
                }
                info!("Webview is ready, starting Flutter process");
                self.display
                    .notify(Notification::info("Starting Flutter web server..."));
                Some(PanelAction::StartServer {
                    custom_flags: settings.custom_flags.clone(),
                })
            }
            PanelMessage::Reload => {
                self.reload();
                Some(PanelAction::HotReload)
            }
            PanelMessage::Rotate => {
                self.rotate();
                None
            }
            PanelMessage::DeviceChanged { device } => {
                self.device = settings.device_preset(&device);
                self.display
                    .notify(Notification::info(format!("Device changed to {}", device)));
                self.device_name = device;
                None
            }
            PanelMessage::FullscreenToggled { is_fullscreen } => {
                let state = if is_fullscreen { "enabled" } else { "disabled" };
                self.display
                    .notify(Notification::info(format!("Fullscreen mode {}", state)));
                None
            }
            PanelMessage::Unknown => {
                debug!("Unhandled panel message command");
                None
            }
        }
    }

    /// Report the outcome of a dev server start to the user and the frame
    pub fn on_server_started(&mut self, url: &str) {
        info!("Received server URL: {}", url);
        self.display.notify(Notification::info(format!(
            "Flutter web server started at {}",
            url
        )));
        self.display.post(DisplayMessage::SetAppUrl {
            url: url.to_string(),
        });
        self.server_url = Some(url.to_string());
    }

    pub fn on_server_failed(&mut self, reason: &str) {
        error!("Failed to start Flutter web server: {}", reason);
        self.display.notify(Notification::error(format!(
            "Failed to start Flutter web server: {}",
            reason
        )));
    }

    /// Ask the frame to reload the embedded page
    pub fn reload(&self) {
        self.display.post(DisplayMessage::Reload);
    }

    /// Toggle between portrait and landscape
    pub fn rotate(&mut self) {
        self.is_portrait = !self.is_portrait;
        debug!("Rotating device, portrait: {}", self.is_portrait);
        self.display.post(DisplayMessage::Rotate {
            is_portrait: self.is_portrait,
        });
    }

    pub fn is_portrait(&self) -> bool {
        self.is_portrait
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Current screen size, taking orientation into account
    pub fn screen(&self) -> DevicePreset {
        if self.is_portrait {
            self.device
        } else {
            self.device.rotated()
        }
    }

    pub fn server_url(&self) -> Option<&str> {
        self.server_url.as_deref()
    }
}
