/*!
Operating-system collaborators: privilege detection and terminating the
target application
*/

use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

/// Name the target application's processes run under
#[cfg(windows)]
const TARGET_PROCESS: &str = "Cursor.exe";
#[cfg(not(windows))]
const TARGET_PROCESS: &str = "Cursor";

pub trait PrivilegeProbe: Send {
    /// Whether the current process runs with administrative/root rights
    fn is_privileged(&self) -> bool;
}

pub trait ProcessTerminator: Send {
    /// Terminate every running instance of the target application
    fn terminate_target(&self) -> io::Result<()>;
}

pub struct SystemPrivilege;

impl PrivilegeProbe for SystemPrivilege {
    #[cfg(unix)]
    fn is_privileged(&self) -> bool {
        nix::unistd::geteuid().is_root()
    }

    // `net session` only succeeds from an elevated prompt
    #[cfg(windows)]
    fn is_privileged(&self) -> bool {
        Command::new("net")
            .arg("session")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    #[cfg(not(any(unix, windows)))]
    fn is_privileged(&self) -> bool {
        false
    }
}

pub struct SystemTerminator;

impl SystemTerminator {
    fn command() -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("taskkill");
            cmd.args(["/F", "/IM", TARGET_PROCESS]);
            cmd
        } else {
            let mut cmd = Command::new("pkill");
            cmd.args(["-f", TARGET_PROCESS]);
            cmd
        }
    }
}

impl ProcessTerminator for SystemTerminator {
    fn terminate_target(&self) -> io::Result<()> {
        let status = Self::command()
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()?;

        // Both tools exit non-zero when nothing matched
        debug!("Terminating {} exited with {}", TARGET_PROCESS, status);
        Ok(())
    }
}
