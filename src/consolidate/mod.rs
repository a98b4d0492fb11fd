pub mod archive;
pub mod artifacts;
pub mod audit;
pub mod config;
pub mod copier;
pub mod keys;
pub mod ledger;
pub mod lock;
pub mod paths;
pub mod pipeline;
pub mod state;
pub mod util;
pub mod warn;
