use std::io::{self, BufRead, BufReader, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::tracker::{TerminalControl, TerminalId};

const OUTPUT_GRACE: Duration = Duration::from_millis(200);
const STOP_GRACE: Duration = Duration::from_millis(500);
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Turns the words given on the command line into one shell command line.
///
/// A single word is used verbatim so `"make && make install"` keeps working.
pub fn command_line(words: &[String]) -> Result<String> {
    match words {
        [] => Err(Error::EmptyCommand),
        [line] if line.trim().is_empty() => Err(Error::EmptyCommand),
        [line] => Ok(line.clone()),
        _ => Ok(shlex::try_join(words.iter().map(String::as_str)).unwrap_or_else(|_| words.join(" "))),
    }
}

#[cfg(unix)]
fn shell_command(line: &str) -> Command {
    use std::os::unix::process::CommandExt;

    let mut command = Command::new("sh");
    command.arg("-c").arg(line);
    command.process_group(0);
    command
}

#[cfg(not(unix))]
fn shell_command(line: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(line);
    command
}

fn forward_lines<R: Read + Send + 'static>(stream: R, tx: Sender<String>) {
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = vec![];
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).trim_end_matches(&['\r', '\n'][..]).to_string();
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::debug!("output reader stopped: {}", e);
                    break;
                }
            }
        }
    });
}

/// A command running in its own shell, standing in for an IDE terminal.
pub struct BuildShell {
    id: TerminalId,
    command_line: String,
    child: Child,
    output: Receiver<String>,
    held: Vec<String>,
}

impl BuildShell {
    pub fn spawn(id: TerminalId, command_line: &str) -> Result<Self> {
        let mut command = shell_command(command_line);
        command.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| Error::Spawn {
            command: command_line.to_string(),
            source,
        })?;
        log::info!("terminal {}: started `{}` (pid {})", id, command_line, child.id());

        let (tx, rx) = channel();
        if let Some(out) = child.stdout.take() {
            forward_lines(out, tx.clone());
        }
        if let Some(err) = child.stderr.take() {
            forward_lines(err, tx);
        }

        Ok(BuildShell {
            id,
            command_line: command_line.to_string(),
            child,
            output: rx,
            held: vec![],
        })
    }

    pub fn id(&self) -> TerminalId {
        self.id
    }

    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    pub fn try_finish(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?)
    }

    pub fn forward_output<W: Write>(&mut self, hold: bool, out: &mut W) -> Result<()> {
        self.held.extend(self.output.try_iter());

        if !hold && !self.held.is_empty() {
            for line in self.held.drain(..) {
                write!(out, "{}\r\n", line)?;
            }
            out.flush()?;
        }

        Ok(())
    }

    /// Writes everything still buffered or in flight once the command is gone.
    pub fn forward_remaining<W: Write>(&mut self, out: &mut W) -> Result<()> {
        loop {
            match self.output.recv_timeout(OUTPUT_GRACE) {
                Ok(line) => self.held.push(line),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.forward_output(false, out)
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) -> io::Result<()> {
        let pid = self.child.id() as libc::pid_t;
        // SAFETY: negative pid targets the process group created at spawn.
        let rc = unsafe { libc::kill(-pid, signal) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                return Err(err);
            }
        }
        Ok(())
    }

    #[cfg(unix)]
    fn signal_interrupt(&mut self) -> io::Result<()> {
        self.signal_group(libc::SIGINT)
    }

    #[cfg(not(unix))]
    fn signal_interrupt(&mut self) -> io::Result<()> {
        match self.child.kill() {
            Err(e) if e.kind() != io::ErrorKind::InvalidInput => Err(e),
            _ => Ok(()),
        }
    }

    fn wait_for_exit(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.child.try_wait() {
                Ok(Some(_)) => return true,
                Ok(None) if Instant::now() < deadline => thread::sleep(STOP_POLL_INTERVAL),
                Ok(None) => return false,
                Err(e) => {
                    log::debug!("terminal {}: could not poll the command: {}", self.id, e);
                    return false;
                }
            }
        }
    }

    #[cfg(unix)]
    fn kill_group(&mut self) -> io::Result<()> {
        self.signal_group(libc::SIGKILL)
    }

    #[cfg(not(unix))]
    fn kill_group(&mut self) -> io::Result<()> {
        self.signal_interrupt()
    }

    /// Interrupts the command, then kills its whole group if it lingers, and reaps it.
    fn stop(&mut self) {
        if let Err(e) = self.signal_interrupt() {
            log::warn!("terminal {}: could not interrupt `{}`: {}", self.id, self.command_line, e);
        }
        if self.wait_for_exit(STOP_GRACE) {
            return;
        }

        log::warn!("terminal {}: `{}` ignored the interrupt, killing it", self.id, self.command_line);
        if let Err(e) = self.kill_group() {
            log::warn!("terminal {}: could not kill `{}`: {}", self.id, self.command_line, e);
        }
        if let Err(e) = self.child.wait() {
            log::warn!("terminal {}: could not reap `{}`: {}", self.id, self.command_line, e);
        }
    }
}

impl Drop for BuildShell {
    fn drop(&mut self) {
        match self.child.try_wait() {
            Ok(Some(_)) => {}
            Ok(None) => {
                log::info!("terminal {}: stopping `{}` on exit", self.id, self.command_line);
                self.stop();
            }
            Err(e) => log::warn!("terminal {}: could not check `{}`: {}", self.id, self.command_line, e),
        }
    }
}

impl TerminalControl for BuildShell {
    fn interrupt(&mut self, terminal: TerminalId) -> Result<()> {
        if terminal != self.id {
            log::debug!("terminal {} is not running here", terminal);
            return Ok(());
        }

        log::info!("terminal {}: interrupting `{}`", self.id, self.command_line);
        self.signal_interrupt()?;
        Ok(())
    }
}

pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|w| w.to_string()).collect()
    }

    fn wait(shell: &mut BuildShell) -> ExitStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            if let Some(status) = shell.try_finish().unwrap() {
                return status;
            }
            assert!(Instant::now() < deadline, "command did not finish");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn command_line_from_words() {
        assert_eq!(command_line(&words(&["cargo", "build"])).unwrap(), "cargo build");
        assert_eq!(command_line(&words(&["make && make install"])).unwrap(), "make && make install");

        let quoted = command_line(&words(&["echo", "two words"])).unwrap();
        assert_eq!(shlex::split(&quoted), Some(words(&["echo", "two words"])));
    }

    #[test]
    fn empty_command_is_an_error() {
        assert!(matches!(command_line(&[]), Err(Error::EmptyCommand)));
        assert!(matches!(command_line(&words(&["  "])), Err(Error::EmptyCommand)));
    }

    #[cfg(unix)]
    #[test]
    fn output_is_held_then_forwarded() {
        let mut shell = BuildShell::spawn(TerminalId(1), "echo one; echo two").unwrap();
        let status = wait(&mut shell);
        assert!(status.success());

        thread::sleep(Duration::from_millis(50));
        let mut out = vec![];
        shell.forward_output(true, &mut out).unwrap();
        assert!(out.is_empty());

        shell.forward_remaining(&mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "one\r\ntwo\r\n");
    }

    #[cfg(unix)]
    #[test]
    fn interrupt_stops_the_command() {
        let mut shell = BuildShell::spawn(TerminalId(4), "sleep 30").unwrap();

        shell.interrupt(TerminalId(9)).unwrap();
        assert!(shell.try_finish().unwrap().is_none());

        shell.interrupt(TerminalId(4)).unwrap();
        let status = wait(&mut shell);
        assert!(!status.success());
        assert_ne!(exit_code(status), 0);
    }

    #[cfg(unix)]
    #[test]
    fn dropping_a_running_shell_stops_the_command() {
        let shell = BuildShell::spawn(TerminalId(5), "sleep 30").unwrap();
        let pid = shell.child.id() as libc::pid_t;

        let started = Instant::now();
        drop(shell);
        assert!(started.elapsed() < Duration::from_secs(5));

        // SAFETY: signal 0 only checks that the reaped pid is gone.
        let rc = unsafe { libc::kill(pid, 0) };
        assert_eq!(rc, -1);
        assert_eq!(io::Error::last_os_error().raw_os_error(), Some(libc::ESRCH));
    }

    #[cfg(unix)]
    #[test]
    fn stubborn_commands_are_killed_on_drop() {
        let shell = BuildShell::spawn(TerminalId(6), "trap '' INT; sleep 30 & wait").unwrap();
        let pid = shell.child.id() as libc::pid_t;
        thread::sleep(Duration::from_millis(100));

        drop(shell);

        // SAFETY: signal 0 only checks that the reaped pid is gone.
        let rc = unsafe { libc::kill(pid, 0) };
        assert_eq!(rc, -1);
    }

    #[cfg(unix)]
    #[test]
    fn exit_codes_pass_through() {
        let mut shell = BuildShell::spawn(TerminalId(2), "exit 3").unwrap();
        assert_eq!(exit_code(wait(&mut shell)), 3);
    }
}
