use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;

use crate::core::hardware::{DeviceHint, MountCandidate, MountResolver};
use crate::core::models::MountPoint;

#[derive(Default)]
struct SimulatedState {
    mount: Mutex<Option<PathBuf>>,
    resolves: AtomicUsize,
}

/// Attaches and detaches the simulated camera.
#[derive(Clone)]
pub struct Simulator {
    state: Arc<SimulatedState>,
}

impl Simulator {
    pub fn attach(&self, path: impl Into<PathBuf>) {
        *self.lock() = Some(path.into());
    }

    pub fn detach(&self) {
        *self.lock() = None;
    }

    /// How many times the resolver has been asked so far.
    pub fn resolve_count(&self) -> usize {
        self.state.resolves.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<PathBuf>> {
        self.state.mount.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A resolver whose "camera" is any directory handed to its [`Simulator`].
///
/// Ignores the hint entirely.
pub struct SimulatedResolver {
    state: Arc<SimulatedState>,
}

impl SimulatedResolver {
    pub fn new() -> (Self, Simulator) {
        let state = Arc::new(SimulatedState::default());
        (
            Self {
                state: Arc::clone(&state),
            },
            Simulator { state },
        )
    }

    fn current(&self) -> Option<PathBuf> {
        self.state
            .mount
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn simulated_mount(path: &Path) -> MountPoint {
    MountPoint {
        path: path.to_path_buf(),
        source: "simulated".to_string(),
        fstype: "simulated".to_string(),
    }
}

impl MountResolver for SimulatedResolver {
    fn resolve(&self, _hint: &DeviceHint) -> Result<Option<MountPoint>> {
        self.state.resolves.fetch_add(1, Ordering::SeqCst);
        Ok(self.current().map(|p| simulated_mount(&p)))
    }

    fn candidates(&self, _hint: &DeviceHint) -> Result<Vec<MountCandidate>> {
        Ok(self
            .current()
            .map(|path| MountCandidate {
                path,
                source: "simulated".to_string(),
                fstype: "simulated".to_string(),
                properties: Default::default(),
            })
            .into_iter()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attach_and_detach() {
        let (resolver, simulator) = SimulatedResolver::new();
        let hint = DeviceHint::default();

        assert!(resolver.resolve(&hint).unwrap().is_none());

        simulator.attach("/tmp/camera");
        let mount = resolver.resolve(&hint).unwrap().unwrap();
        assert_eq!(mount.path, PathBuf::from("/tmp/camera"));
        assert_eq!(resolver.candidates(&hint).unwrap().len(), 1);

        simulator.detach();
        assert!(resolver.resolve(&hint).unwrap().is_none());
        assert_eq!(simulator.resolve_count(), 3);
    }
}
