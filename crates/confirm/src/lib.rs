pub mod backoff;
pub mod fanout;
pub mod multisig;
pub mod racer;

pub use backoff::PollingBackoff;
pub use fanout::or_default;
pub use multisig::{
    wait_for_multisig_execution, MultisigService, MultisigTransaction, MultisigWaitConfig,
};
pub use racer::{race, race_first_success, RaceConfig};
