//! `kte verify`: replays an audit log's hash chain (spec §6) and reports
//! whether it is intact.

use anyhow::Result;
use kte_events::ChainVerification;

pub fn run(path: &str) -> Result<()> {
    match kte_events::audit::verify_chain(path)? {
        ChainVerification::Valid { lines } => {
            println!("chain_ok=true lines={lines}");
            Ok(())
        }
        ChainVerification::Broken { line, reason } => {
            println!("chain_ok=false line={line} reason={reason}");
            anyhow::bail!("audit chain broken at line {line}: {reason}")
        }
    }
}
