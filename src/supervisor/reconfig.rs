//! Hot reconfiguration: the reread/update diff protocol.

use super::Supervisor;
use crate::config;
use crate::program::Program;

impl Supervisor {
    /// Load a fresh configuration into a scratch catalog. On success it is
    /// stored as pending; on failure it is discarded and the active
    /// configuration is preserved untouched.
    pub fn reread(&mut self) -> String {
        match config::load(Some(self.config_path.as_path())) {
            Ok(settings) => {
                self.pending = Some(settings.programs);
                "Configuration file reread successfully - run `update` to apply changes"
                    .to_string()
            }
            Err(e) => {
                warn!("reread failed: {e}");
                format!("{e}")
            }
        }
    }

    /// Diff the pending configuration against the baseline snapshot and
    /// apply per program. Without a pending configuration this is a no-op.
    /// Application is not transactional: a failing start partway through
    /// leaves earlier changes in place.
    pub async fn update(&mut self) -> String {
        let Some(incoming) = self.pending.take() else {
            return "Update ran successfully".to_string();
        };

        let removed: Vec<String> = self
            .baseline
            .keys()
            .filter(|name| !incoming.contains_key(*name))
            .cloned()
            .collect();
        for name in removed {
            let response = self.stop_one(&name).await;
            debug!("update: {}", response.trim_end_matches('|'));
            self.catalog.shift_remove(&name);
        }

        for (name, incoming_config) in &incoming {
            match self.baseline.get(name) {
                None => {
                    self.catalog
                        .insert(name.clone(), Program::new(incoming_config.clone()));
                    if incoming_config.autostart {
                        let response = self.start_one(name).await;
                        debug!("update: {}", response.trim_end_matches('|'));
                    }
                }
                Some(previous) if previous != incoming_config => {
                    let response = self.stop_one(name).await;
                    debug!("update: {}", response.trim_end_matches('|'));
                    match self.catalog.get_mut(name) {
                        Some(program) => program.config = incoming_config.clone(),
                        None => {
                            self.catalog
                                .insert(name.clone(), Program::new(incoming_config.clone()));
                        }
                    }
                    if incoming_config.autostart {
                        let response = self.start_one(name).await;
                        debug!("update: {}", response.trim_end_matches('|'));
                    }
                }
                Some(_) => {}
            }
        }

        self.baseline = incoming;
        "Update ran successfully".to_string()
    }
}
