//! The supervision engine.
//!
//! Owns the program catalog and is the only component that mutates it. All
//! operations run on the control loop task, one at a time; monitor ticks
//! never overlap an in-flight command. Split into focused submodules:
//! - `lifecycle`: start/stop/restart algorithms
//! - `monitor`: the periodic exit probe and autorestart policy
//! - `reconfig`: the reread/update diff protocol
//! - `status`: status rendering and tail

mod lifecycle;
mod monitor;
mod reconfig;
mod status;

use crate::config::{ProgramConfig, Settings};
use crate::program::{Catalog, Program, ProgramState};
use crate::protocol::Command;
use indexmap::IndexMap;
use std::path::PathBuf;

pub struct Supervisor {
    pub(crate) catalog: Catalog,
    /// Snapshot of the last applied configuration; operand of the `update`
    /// diff.
    pub(crate) baseline: IndexMap<String, ProgramConfig>,
    /// Result of the last successful `reread`, waiting for `update`.
    pub(crate) pending: Option<IndexMap<String, ProgramConfig>>,
    pub(crate) config_path: PathBuf,
}

impl Supervisor {
    pub fn new(settings: Settings) -> Self {
        let catalog = settings
            .programs
            .iter()
            .map(|(name, config)| (name.clone(), Program::new(config.clone())))
            .collect();
        Self {
            catalog,
            baseline: settings.programs,
            pending: None,
            config_path: settings.path,
        }
    }

    /// Spawn every autostart program, then log the initial program table.
    pub async fn init(&mut self) {
        let autostart: Vec<String> = self
            .catalog
            .iter()
            .filter(|(_, program)| program.config.autostart)
            .map(|(name, _)| name.clone())
            .collect();
        if !autostart.is_empty() {
            let response = self.start_programs(&autostart).await;
            debug!("autostart: {response}");
        }
        for record in self.status().split('|').filter(|r| !r.is_empty()) {
            info!("{record}");
        }
    }

    /// Run one client command to completion and render its response.
    pub async fn dispatch(&mut self, command: Command) -> String {
        match command {
            Command::Status => self.status(),
            Command::Start(names) => self.start_programs(&names).await,
            Command::Stop(names) => self.stop_programs(&names).await,
            Command::Restart(names) => self.restart_programs(&names).await,
            Command::Reread => self.reread(),
            Command::Update => self.update().await,
            Command::Tail { name, stream } => self.tail(&name, stream).await,
            Command::Shutdown => self.shutdown().await,
        }
    }

    /// Stop every program; the control server sends the terminal reply and
    /// exits the process afterwards.
    pub async fn shutdown(&mut self) -> String {
        let response = self.stop_programs(&["all".to_string()]).await;
        debug!("shutdown: {response}");
        "Shut down overseerd successfully".to_string()
    }

    /// The literal `all` expands to every program in configuration order.
    pub(crate) fn expand_names(&self, names: &[String]) -> Vec<String> {
        if names.first().is_some_and(|name| name == "all") {
            self.catalog.keys().cloned().collect()
        } else {
            names.to_vec()
        }
    }

    pub(crate) fn set_state(&mut self, name: &str, state: ProgramState) {
        if let Some(program) = self.catalog.get_mut(name) {
            program.runtime.state = state;
        }
    }

    pub fn program(&self, name: &str) -> Option<&Program> {
        self.catalog.get(name)
    }

    pub fn state(&self, name: &str) -> Option<ProgramState> {
        self.catalog.get(name).map(|p| p.runtime.state)
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.catalog.keys()
    }
}
