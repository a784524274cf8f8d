use crate::domain::models::{AppEvent, ConnectionStatus, OperationStatus, Theme};
use crate::infrastructure::local_storage::{SERVER_ADDRESS_KEY, THEME_KEY};
use crate::infrastructure::remote::{RemoteSession, TransportEvent};
use crate::presentation::console::{self, UserCommand, HELP};
use crate::presentation::theme::ConsolePalette;
use anyhow::Result;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

pub struct ConsoleApp {
    session: RemoteSession,
    default_scan_seconds: u64,
    theme: Theme,
    palette: ConsolePalette,
    // Set by a first `quit` while an operation is running
    quit_armed: bool,
}

impl ConsoleApp {
    pub fn new(session: RemoteSession, default_scan_seconds: u64) -> Self {
        let theme = Theme::parse_or_default(session.storage().get_item(THEME_KEY));
        Self {
            session,
            default_scan_seconds,
            theme,
            palette: ConsolePalette::new(theme),
            quit_armed: false,
        }
    }

    /// Drive the session until stdin closes or the user quits.
    ///
    /// Console input, transport events, session notifications and the scan
    /// deadline are handled one at a time on this task.
    pub async fn run(
        mut self,
        initial_address: Option<String>,
        mut app_events: mpsc::UnboundedReceiver<AppEvent>,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> Result<()> {
        println!("{}", self.palette.paint(self.palette.heading, "BLE Replay Client"));
        match self.remembered_address(initial_address) {
            Some(address) => {
                // Failures arrive as events
                let _ = self.session.connect(&address).await;
            }
            None => println!("No server yet, use `connect host:port` (`help` lists commands)"),
        }

        let mut input = BufReader::new(tokio::io::stdin()).lines();

        loop {
            let deadline = self.session.scan_deadline();
            tokio::select! {
                line = input.next_line() => match line? {
                    Some(line) => {
                        if !self.handle_input(&line).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(event) = transport_events.recv() => {
                    self.session.handle_transport_event(event);
                }
                Some(event) = app_events.recv() => self.show_event(event),
                _ = wait_until(deadline) => self.session.expire_scan(Instant::now()),
            }
        }

        self.session.disconnect();
        info!("Console closed");
        Ok(())
    }

    fn remembered_address(&self, initial_address: Option<String>) -> Option<String> {
        initial_address.or_else(|| {
            self.session
                .storage()
                .get_item(SERVER_ADDRESS_KEY)
                .filter(|address| !address.is_empty())
                .map(str::to_string)
        })
    }

    /// Returns `false` when the console should close.
    async fn handle_input(&mut self, line: &str) -> bool {
        let command = match UserCommand::parse(line) {
            Ok(Some(command)) => command,
            Ok(None) => return true,
            Err(e) => {
                self.print_error(&e.to_string());
                return true;
            }
        };
        debug!("Console command: {:?}", command);

        if command != UserCommand::Quit {
            self.quit_armed = false;
        }

        let result = match command {
            UserCommand::Connect(address) => self.connect(address).await,
            UserCommand::Disconnect => {
                self.session.disconnect();
                Ok(())
            }
            UserCommand::Scan(seconds) => {
                let seconds = seconds.unwrap_or(self.default_scan_seconds);
                self.session.start_scan(seconds, Instant::now());
                Ok(())
            }
            UserCommand::Stop => {
                self.session.stop();
                Ok(())
            }
            UserCommand::Simulate(index) => self.session.simulate(index),
            UserCommand::Store { addr, alias } => self.session.store_device(&addr, &alias),
            UserCommand::Rename { index, alias } => self.session.rename(index, &alias),
            UserCommand::Delete(index) => self.session.delete(index),
            UserCommand::Load => {
                self.session.load_stored();
                Ok(())
            }
            UserCommand::Save => {
                self.session.save_stored();
                Ok(())
            }
            UserCommand::Clear => {
                self.session.clear_scanned();
                Ok(())
            }
            UserCommand::Devices(filter) => {
                println!(
                    "{}",
                    console::render_scanned(
                        self.session.registry().scanned(),
                        self.session.manufacturers(),
                        filter.as_deref(),
                    )
                );
                Ok(())
            }
            UserCommand::Stored => {
                self.print_stored();
                Ok(())
            }
            UserCommand::Status => {
                self.print_status(self.session.operation().status());
                self.session.request_status();
                Ok(())
            }
            UserCommand::Theme => self.toggle_theme(),
            UserCommand::Help => {
                println!("{}", HELP);
                Ok(())
            }
            UserCommand::Quit => {
                let busy = self.session.operation().status() != OperationStatus::Idle;
                if !busy || self.quit_armed {
                    return false;
                }
                self.quit_armed = true;
                println!(
                    "{}",
                    self.palette.paint(
                        self.palette.accent_yellow,
                        "An operation is still running, type `quit` again to leave"
                    )
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            self.print_error(&format!("{:#}", e));
        }
        true
    }

    async fn connect(&mut self, address: Option<String>) -> Result<()> {
        let address = self
            .remembered_address(address)
            .ok_or_else(|| anyhow::anyhow!("No server address, use `connect host:port`"))?;
        // Failures arrive as events
        let _ = self.session.connect(&address).await;
        Ok(())
    }

    fn toggle_theme(&mut self) -> Result<()> {
        self.theme = self.theme.toggled();
        self.palette = ConsolePalette::new(self.theme);
        self.session
            .storage_mut()
            .set_item(THEME_KEY, self.theme.as_str())?;
        println!("Theme: {}", self.theme.as_str());
        Ok(())
    }

    fn show_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::ConnectionStatus(status) => {
                let (text, color) = match status {
                    ConnectionStatus::Connected => (
                        format!(
                            "Connected to {}",
                            self.session.current_address().unwrap_or("server")
                        ),
                        self.palette.accent_green,
                    ),
                    ConnectionStatus::Connecting => {
                        ("Connecting...".to_string(), self.palette.accent_yellow)
                    }
                    ConnectionStatus::Disconnected => {
                        ("Disconnected".to_string(), self.palette.muted)
                    }
                    ConnectionStatus::Error => {
                        ("Connection error".to_string(), self.palette.accent_red)
                    }
                };
                println!("{}", self.palette.paint(color, &text));
            }
            AppEvent::OperationStatus(status) => self.print_status(status),
            AppEvent::StoredDevicesChanged => self.print_stored(),
            // Scans report continuously, the table is shown on request
            AppEvent::ScannedDevicesChanged => {}
            AppEvent::LogMessage(message) => {
                let color = self.palette.severity(message.severity);
                println!("{}", self.palette.paint(color, &message.message));
            }
        }
    }

    fn print_status(&self, status: OperationStatus) {
        let stored = self.session.registry().stored();
        let mut text = format!("Status: {}", status);
        let simulating = self.session.operation().simulating();
        if let Some(index) = console::simulated_position(stored, simulating) {
            text.push_str(&format!(" ({})", stored[index].alias));
        }
        if !self.session.is_connected() {
            text.push_str(" [not connected]");
        }
        println!("{}", self.palette.paint(self.palette.status(status), &text));
    }

    fn print_stored(&self) {
        println!(
            "{}",
            console::render_stored(
                self.session.registry().stored(),
                self.session.manufacturers(),
                self.session.operation().simulating(),
            )
        );
    }

    fn print_error(&self, message: &str) {
        eprintln!("{}", self.palette.paint(self.palette.accent_red, message));
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending().await,
    }
}
