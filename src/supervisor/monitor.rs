//! The monitor tick: reap exited children, apply autorestart policy.

use super::Supervisor;
use crate::config::Autorestart;
use crate::program::ProgramState;

impl Supervisor {
    /// One opportunistic pass over the catalog. Runs whenever the control
    /// server's accept or recv times out, and never blocks on any single
    /// child; no state is carried across ticks beyond the catalog itself.
    pub async fn monitor_tick(&mut self) {
        let mut to_restart = Vec::new();
        for (name, program) in self.catalog.iter_mut() {
            if !program.runtime.state.is_running() {
                continue;
            }
            let Some(child) = program.runtime.child.as_mut() else {
                continue;
            };
            match child.try_wait() {
                Ok(None) => {}
                Ok(Some(status)) => {
                    info!("{name} exited with {status}");
                    let code = status.code();
                    program.runtime.clear(ProgramState::Exited);
                    let restart = match program.config.autorestart {
                        Autorestart::Always => true,
                        Autorestart::Never => false,
                        // a signal death carries no exit code and is never
                        // an expected exit
                        Autorestart::Unexpected => {
                            !code.is_some_and(|c| program.config.expected_exit.contains(&c))
                        }
                    };
                    if restart {
                        to_restart.push(name.clone());
                    }
                }
                Err(e) => warn!("{name}: probing child failed: {e}"),
            }
        }
        for name in to_restart {
            let response = self.start_one(&name).await;
            debug!("autorestart: {}", response.trim_end_matches('|'));
        }
    }
}
