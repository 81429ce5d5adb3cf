pub mod system;

use crate::routes::ControllerRegistry;

/// Registers every built-in controller. An embedding application calls
/// this first, then adds its own handlers under its own keys.
pub fn register_all(controllers: &mut ControllerRegistry) {
    system::register(controllers);
}
