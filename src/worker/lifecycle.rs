use color_eyre::{eyre::eyre, Result};

/// Worker lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Loaded, no lifecycle event dispatched yet
  Parsed,
  /// Install event running
  Installing,
  /// Installed, waiting for the previous version to release its windows
  Installed,
  /// Activate event running
  Activating,
  /// Active and intercepting requests
  Activated,
}

impl WorkerState {
  /// States that may legally follow this one.
  fn can_become(self, next: WorkerState) -> bool {
    use WorkerState::*;
    matches!(
      (self, next),
      (Parsed, Installing)
        | (Installing, Installed)
        | (Installed, Activating)
        | (Activating, Activated)
    )
  }
}

impl std::fmt::Display for WorkerState {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
    }
  }
}

/// Lifecycle bookkeeping for one worker version.
#[derive(Debug)]
pub struct Lifecycle {
  state: WorkerState,
  skip_waiting: bool,
}

impl Lifecycle {
  pub fn new() -> Self {
    Self {
      state: WorkerState::Parsed,
      skip_waiting: false,
    }
  }

  /// Lifecycle of a version that already went through install and activate.
  pub fn resumed() -> Self {
    Self {
      state: WorkerState::Activated,
      skip_waiting: false,
    }
  }

  pub fn state(&self) -> WorkerState {
    self.state
  }

  pub fn transition(&mut self, next: WorkerState) -> Result<()> {
    if !self.state.can_become(next) {
      return Err(eyre!(
        "Invalid lifecycle transition: {} -> {}",
        self.state,
        next
      ));
    }
    self.state = next;
    Ok(())
  }

  /// Record a skip-waiting request. A waiting worker moves to `Activating` right
  /// away and the call returns true; the caller then finishes the activation.
  pub fn skip_waiting(&mut self) -> Result<bool> {
    self.skip_waiting = true;
    if self.state != WorkerState::Installed {
      return Ok(false);
    }
    self.transition(WorkerState::Activating)?;
    Ok(true)
  }

  /// Whether an installed worker may activate now: either skip-waiting was
  /// requested or no window is still held by the previous version.
  pub fn ready_to_activate(&self, open_windows: usize) -> bool {
    self.state == WorkerState::Installed && (self.skip_waiting || open_windows == 0)
  }
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_full_lifecycle() {
    let mut lifecycle = Lifecycle::new();
    for next in [
      WorkerState::Installing,
      WorkerState::Installed,
      WorkerState::Activating,
      WorkerState::Activated,
    ] {
      lifecycle.transition(next).unwrap();
    }
    assert_eq!(lifecycle.state(), WorkerState::Activated);
  }

  #[test]
  fn test_cannot_skip_install() {
    let mut lifecycle = Lifecycle::new();
    let err = lifecycle.transition(WorkerState::Activating).unwrap_err();
    assert!(err.to_string().contains("parsed -> activating"));
  }

  #[test]
  fn test_activated_is_final() {
    let mut lifecycle = Lifecycle::resumed();
    assert!(lifecycle.transition(WorkerState::Activating).is_err());
    assert!(lifecycle.transition(WorkerState::Installing).is_err());
  }

  #[test]
  fn test_waits_for_open_windows() {
    let mut lifecycle = Lifecycle::new();
    lifecycle.transition(WorkerState::Installing).unwrap();
    lifecycle.transition(WorkerState::Installed).unwrap();

    assert!(!lifecycle.ready_to_activate(2));
    assert!(lifecycle.ready_to_activate(0));
  }

  #[test]
  fn test_early_skip_waiting_is_remembered() {
    let mut lifecycle = Lifecycle::new();
    assert!(!lifecycle.skip_waiting().unwrap());
    assert_eq!(lifecycle.state(), WorkerState::Parsed);

    lifecycle.transition(WorkerState::Installing).unwrap();
    lifecycle.transition(WorkerState::Installed).unwrap();
    assert!(lifecycle.ready_to_activate(3));
  }

  #[test]
  fn test_skip_waiting_starts_activation_once() {
    let mut lifecycle = Lifecycle::new();
    lifecycle.transition(WorkerState::Installing).unwrap();
    lifecycle.transition(WorkerState::Installed).unwrap();

    assert!(lifecycle.skip_waiting().unwrap());
    assert_eq!(lifecycle.state(), WorkerState::Activating);
    assert!(!lifecycle.skip_waiting().unwrap());
    assert_eq!(lifecycle.state(), WorkerState::Activating);
  }
}
