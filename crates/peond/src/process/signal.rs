//! Liveness probing and termination signalling for recorded PIDs.

use std::thread;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{Signal, kill};
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use peon_config::StopPolicy;

use super::PROCESS_TARGET;
use super::errors::LifecycleError;

/// Converts a recorded PID into a target `kill(2)` will not widen to a group.
pub(super) fn validate_pid(pid: u32) -> Result<Pid, LifecycleError> {
    if pid == 0 {
        return Err(LifecycleError::InvalidPid {
            pid,
            reason: "pid 0 refers to the caller's process group",
        });
    }
    match i32::try_from(pid) {
        Ok(raw) => Ok(Pid::from_raw(raw)),
        Err(_) => Err(LifecycleError::InvalidPid {
            pid,
            reason: "pid exceeds the platform's maximum process identifier",
        }),
    }
}

/// Reports whether `pid` names a live process.
///
/// `EPERM` means the process exists but belongs to someone else, so it
/// counts as alive.
pub(super) fn check_process(pid: u32) -> Result<bool, LifecycleError> {
    let Ok(target) = validate_pid(pid) else {
        return Ok(false);
    };
    match kill(target, None) {
        Ok(()) => Ok(!is_zombie(pid)),
        Err(Errno::EPERM) => Ok(true),
        Err(Errno::ESRCH | Errno::ECHILD) => Ok(false),
        Err(errno) => Err(LifecycleError::CheckProcess { pid, source: errno }),
    }
}

/// Sends `SIGTERM` to `pid` until delivery fails.
///
/// Returns the number of signals delivered before the process disappeared;
/// zero means the record was already stale. A process found exited but
/// unreaped counts as gone. Any errno other than `ESRCH` aborts the loop.
pub(super) fn terminate(pid: u32, policy: StopPolicy) -> Result<u32, LifecycleError> {
    terminate_with(pid, policy, |target, signal| kill(target, signal))
}

fn terminate_with<K>(pid: u32, policy: StopPolicy, mut send: K) -> Result<u32, LifecycleError>
where
    K: FnMut(Pid, Signal) -> nix::Result<()>,
{
    let target = validate_pid(pid)?;
    let mut deadline = policy.timeout.map(|timeout| Instant::now() + timeout);
    let mut escalated = false;
    let mut delivered = 0u32;
    loop {
        match send(target, Signal::SIGTERM) {
            Ok(()) if is_zombie(pid) => {
                info!(
                    target: PROCESS_TARGET,
                    pid,
                    attempts = delivered,
                    "process has exited but was not reaped yet"
                );
                return Ok(delivered);
            }
            Ok(()) => {
                delivered = delivered.saturating_add(1);
                debug!(
                    target: PROCESS_TARGET,
                    pid,
                    attempt = delivered,
                    "sent SIGTERM"
                );
            }
            Err(Errno::ESRCH) => {
                info!(
                    target: PROCESS_TARGET,
                    pid,
                    attempts = delivered,
                    "process no longer exists"
                );
                return Ok(delivered);
            }
            Err(source) => {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    error = %source,
                    "failed to deliver SIGTERM"
                );
                return Err(LifecycleError::SignalDelivery {
                    pid,
                    signal: "SIGTERM",
                    source,
                });
            }
        }
        if let Some(limit) = deadline
            && Instant::now() >= limit
        {
            let timeout = policy.timeout.unwrap_or(Duration::ZERO);
            if !policy.escalate || escalated {
                warn!(
                    target: PROCESS_TARGET,
                    pid,
                    timeout_ms = timeout.as_millis(),
                    "process ignored termination requests"
                );
                return Err(LifecycleError::StopTimeout {
                    pid,
                    timeout_ms: timeout.as_millis(),
                });
            }
            escalate(&mut send, target, pid)?;
            escalated = true;
            deadline = Some(Instant::now() + timeout);
        }
        thread::sleep(policy.interval);
    }
}

/// Reports whether `pid` has exited but not been reaped by its parent.
///
/// A zombie still accepts signals even though it will never run again.
#[cfg(target_os = "linux")]
fn is_zombie(pid: u32) -> bool {
    std::fs::read_to_string(format!("/proc/{pid}/stat"))
        .ok()
        .and_then(|stat| {
            let (_, after_name) = stat.rsplit_once(')')?;
            after_name.trim_start().chars().next()
        })
        .is_some_and(|state| state == 'Z')
}

#[cfg(not(target_os = "linux"))]
fn is_zombie(_pid: u32) -> bool {
    false
}

fn escalate<K>(send: &mut K, target: Pid, pid: u32) -> Result<(), LifecycleError>
where
    K: FnMut(Pid, Signal) -> nix::Result<()>,
{
    warn!(
        target: PROCESS_TARGET,
        pid,
        "stop timeout elapsed; sending SIGKILL"
    );
    match send(target, Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(source) => Err(LifecycleError::SignalDelivery {
            pid,
            signal: "SIGKILL",
            source,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::process_group(0)]
    #[case::negative_when_cast(u32::MAX)]
    #[case::just_above_range(i32::MAX as u32 + 1)]
    fn rejects_pids_that_widen_the_signal(#[case] pid: u32) {
        let error = validate_pid(pid).expect_err("pid should be rejected");
        assert!(matches!(error, LifecycleError::InvalidPid { .. }));
    }

    #[test]
    fn current_process_is_alive() {
        assert!(check_process(std::process::id()).expect("probe succeeds"));
    }

    #[test]
    fn unreaped_child_probes_as_dead() {
        let mut child = std::process::Command::new("true")
            .spawn()
            .expect("spawn true");
        let pid = child.id();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !is_zombie(pid) && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        #[cfg(target_os = "linux")]
        assert!(!check_process(pid).expect("probe succeeds"));
        child.wait().expect("reap child");
    }

    #[test]
    fn unusable_pids_probe_as_dead() {
        assert!(!check_process(0).expect("probe succeeds"));
        assert!(!check_process(u32::MAX).expect("probe succeeds"));
    }

    #[test]
    fn terminate_refuses_invalid_pid_without_signalling() {
        let error = terminate(0, StopPolicy::default()).expect_err("pid 0 is rejected");
        assert!(matches!(error, LifecycleError::InvalidPid { pid: 0, .. }));
    }

    fn policy(timeout_ms: u64, escalate: bool) -> StopPolicy {
        StopPolicy {
            interval: Duration::from_millis(1),
            timeout: Some(Duration::from_millis(timeout_ms)),
            escalate,
        }
    }

    #[test]
    fn delivery_failure_aborts_the_loop() {
        let pid = std::process::id();
        let error = terminate_with(pid, policy(50, false), |_, _| Err(Errno::EPERM))
            .expect_err("EPERM must abort the stop");
        assert!(matches!(
            error,
            LifecycleError::SignalDelivery {
                signal: "SIGTERM",
                source: Errno::EPERM,
                ..
            }
        ));
    }

    #[test]
    fn escalation_sends_a_single_sigkill() {
        let pid = std::process::id();
        let mut killed = 0u32;
        let delivered = terminate_with(pid, policy(5, true), |_, signal| match signal {
            Signal::SIGKILL => {
                killed += 1;
                Ok(())
            }
            _ if killed > 0 => Err(Errno::ESRCH),
            _ => Ok(()),
        })
        .expect("escalation should stop the process");
        assert_eq!(killed, 1);
        assert!(delivered >= 1);
    }

    #[test]
    fn escalation_gives_up_when_sigkill_is_ignored() {
        let pid = std::process::id();
        let mut killed = 0u32;
        let error = terminate_with(pid, policy(5, true), |_, signal| {
            if signal == Signal::SIGKILL {
                killed += 1;
            }
            Ok(())
        })
        .expect_err("a process that survives SIGKILL times out");
        assert!(matches!(error, LifecycleError::StopTimeout { timeout_ms: 5, .. }));
        assert_eq!(killed, 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn process_ignoring_sigterm_times_out_without_escalation() {
        let mut child = std::process::Command::new("sh")
            .args(["-c", "trap '' TERM; echo ready; exec sleep 30"])
            .stdout(std::process::Stdio::piped())
            .spawn()
            .expect("spawn sh");
        let mut line = String::new();
        std::io::BufRead::read_line(
            &mut std::io::BufReader::new(child.stdout.take().expect("piped stdout")),
            &mut line,
        )
        .expect("read readiness line");
        let pid = child.id();

        let error = terminate(pid, policy(200, false)).expect_err("SIGTERM is ignored");
        assert!(matches!(error, LifecycleError::StopTimeout { timeout_ms: 200, .. }));
        assert!(check_process(pid).expect("probe succeeds"));

        let delivered = terminate(pid, policy(200, true));
        child.wait().expect("reap child");
        assert!(delivered.expect("escalation stops the process") >= 1);
    }
}
