// The content pipeline orchestrator — owns per-platform activation
// records, dispatches interactions to the first platform that claims
// them, and hot-reloads activation from the settings change feed.
//
// This is the error boundary: whatever a platform handler does, the
// failure is journaled here and the dispatch loop survives. A handler
// exception must never disable future interactions.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::config::{self, ConfigResolver, Switches};
use crate::download::Downloader;
use crate::errlog::ErrorLogger;
use crate::net::{HttpFetch, NetworkHub};
use crate::notify::Notifier;
use crate::page::Page;
use crate::platforms::pixiv::PixivPlatform;
use crate::platforms::twitter::TwitterPlatform;
use crate::platforms::{InteractionEvent, Platform, PlatformKind};
use crate::storage::{KvStore, Scope, StoreChange};

/// One platform plus its activation state. Activation is data owned
/// here, not a module-level flag somewhere.
struct Activation {
    active: bool,
    platform: Box<dyn Platform>,
}

pub struct Orchestrator {
    activations: Vec<Activation>,
    config: ConfigResolver,
    notifier: Arc<dyn Notifier>,
    errlog: Arc<ErrorLogger>,
    changes: broadcast::Receiver<StoreChange>,
}

impl Orchestrator {
    /// Wire the full pipeline over the given collaborators and read the
    /// initial activation state from configuration.
    pub async fn new(
        store: Arc<dyn KvStore>,
        downloader: Arc<Downloader>,
        notifier: Arc<dyn Notifier>,
        hub: NetworkHub,
        http: Arc<dyn HttpFetch>,
        initial_url: &str,
    ) -> Result<Self> {
        let config = ConfigResolver::new(store.clone());
        let errlog = Arc::new(ErrorLogger::new(store.clone()));
        let changes = store.subscribe();

        let twitter = TwitterPlatform::new(
            config.clone(),
            downloader.clone(),
            errlog.clone(),
            notifier.clone(),
            hub,
            http,
        );
        let pixiv = PixivPlatform::new(
            config.clone(),
            downloader,
            errlog.clone(),
            notifier.clone(),
            initial_url,
        );

        let switches = config.switches().await?;
        notifier.set_enabled(config.notifications_enabled().await?);

        Ok(Self {
            activations: vec![
                Activation {
                    active: switches.twitter,
                    platform: Box::new(twitter),
                },
                Activation {
                    active: switches.pixiv,
                    platform: Box::new(pixiv),
                },
            ],
            config,
            notifier,
            errlog,
            changes,
        })
    }

    pub fn is_active(&self, kind: PlatformKind) -> bool {
        self.activations
            .iter()
            .any(|a| a.active && a.platform.kind() == kind)
    }

    fn apply_switches(&mut self, switches: Switches) {
        for activation in &mut self.activations {
            let active = match activation.platform.kind() {
                PlatformKind::Twitter => switches.twitter,
                PlatformKind::Pixiv => switches.pixiv,
            };
            if activation.active != active {
                info!(
                    platform = activation.platform.kind().name(),
                    active, "platform activation changed"
                );
                activation.active = active;
            }
        }
    }

    /// Drain pending settings-change notices and re-read what they
    /// affect. Called before each dispatch, so a toggle from the
    /// settings surface takes effect on the next interaction without a
    /// reload.
    pub async fn pump_config_changes(&mut self) -> Result<()> {
        let mut switches_changed = false;
        let mut notifications_changed = false;
        loop {
            match self.changes.try_recv() {
                Ok(change) => {
                    if change.scope != Scope::Synced {
                        continue;
                    }
                    if config::is_switch_key(&change.key) {
                        switches_changed = true;
                    }
                    if change.key == config::KEY_NOTIFICATIONS_ENABLED {
                        notifications_changed = true;
                    }
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => {
                    // Missed notices: re-read everything to be safe.
                    switches_changed = true;
                    notifications_changed = true;
                }
                Err(_) => break,
            }
        }

        if switches_changed {
            let switches = self.config.switches().await?;
            self.apply_switches(switches);
        }
        if notifications_changed {
            self.notifier
                .set_enabled(self.config.notifications_enabled().await?);
        }
        Ok(())
    }

    /// Dispatch one interaction. The first active platform that detects
    /// its control handles it; handler failures are journaled and
    /// swallowed. Returns the platform that consumed the click, if any.
    pub async fn handle_click(
        &mut self,
        page: &Page,
        event: InteractionEvent,
    ) -> Option<PlatformKind> {
        if let Err(err) = self.pump_config_changes().await {
            error!(error = %err, "config reload failed, keeping previous activation");
        }

        for activation in &self.activations {
            if !activation.active {
                continue;
            }
            if let Some(hint) = event.platform_hint {
                if activation.platform.kind() != hint {
                    continue;
                }
            }
            if !activation.platform.detect(page, event) {
                continue;
            }
            let kind = activation.platform.kind();
            debug!(platform = kind.name(), "interaction detected");
            match activation.platform.handle(page, event).await {
                Ok(consumed) => {
                    if consumed {
                        return Some(kind);
                    }
                }
                Err(err) => {
                    // Boundary: journal and carry on; the listener stays
                    // usable for the next interaction.
                    error!(platform = kind.name(), error = %err, "handler failed");
                    if let Err(log_err) = self
                        .errlog
                        .log(kind.name(), "handleAction", page.url_str(), &err.to_string(), 0)
                        .await
                    {
                        error!(error = %log_err, "error journal write failed");
                    }
                    return Some(kind);
                }
            }
            // A platform that detected but didn't consume ends the scan,
            // matching the first-match dispatch contract.
            return None;
        }
        None
    }
}
