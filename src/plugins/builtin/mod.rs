//! Plugin modules compiled into the application

pub mod dagnode;
pub mod lookdev;
pub mod merge;

use super::registrar::StaticModule;

/// Every compiled-in module, in registration order
pub fn static_modules() -> Vec<StaticModule> {
    vec![dagnode::MODULE, merge::MODULE, lookdev::MODULE]
}
