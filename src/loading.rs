use log::debug;
use thiserror::Error;

/// Direction of the structural application in progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    Idle,
    LoadingPrevious,
    LoadingNext,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadDirection {
    Previous,
    Next,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("a {0:?} application is already in progress")]
pub struct LoadingBusy(pub LoadingState);

/// Mutex over structural operations on the window.
///
/// Fetches for the two edges may overlap; applying their results may not. A
/// result is only inserted, remapped and re-anchored while the machine is in
/// `LoadingPrevious`/`LoadingNext`, and only one of those can be held.
#[derive(Debug, Default)]
pub struct LoadingStateMachine {
    state: LoadingState,
}

impl LoadingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LoadingState {
        self.state
    }

    pub fn can_start_loading(&self) -> bool {
        self.state == LoadingState::Idle
    }

    pub fn begin(&mut self, direction: LoadDirection) -> Result<(), LoadingBusy> {
        if self.state != LoadingState::Idle {
            return Err(LoadingBusy(self.state));
        }
        self.state = match direction {
            LoadDirection::Previous => LoadingState::LoadingPrevious,
            LoadDirection::Next => LoadingState::LoadingNext,
        };
        debug!("loading state -> {:?}", self.state);
        Ok(())
    }

    pub fn finish(&mut self) {
        if self.state != LoadingState::Idle {
            debug!("loading state {:?} -> Idle", self.state);
        }
        self.state = LoadingState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_idle() {
        let machine = LoadingStateMachine::new();
        assert!(machine.can_start_loading());
        assert_eq!(machine.state(), LoadingState::Idle);
    }

    #[test]
    fn only_one_application_at_a_time() {
        let mut machine = LoadingStateMachine::new();
        machine.begin(LoadDirection::Previous).unwrap();
        assert!(!machine.can_start_loading());
        assert_eq!(
            machine.begin(LoadDirection::Next),
            Err(LoadingBusy(LoadingState::LoadingPrevious))
        );
        assert_eq!(
            machine.begin(LoadDirection::Previous),
            Err(LoadingBusy(LoadingState::LoadingPrevious))
        );
        machine.finish();
        assert!(machine.begin(LoadDirection::Next).is_ok());
        assert_eq!(machine.state(), LoadingState::LoadingNext);
    }

    #[test]
    fn finish_from_idle_is_harmless() {
        let mut machine = LoadingStateMachine::new();
        machine.finish();
        assert!(machine.can_start_loading());
    }
}
