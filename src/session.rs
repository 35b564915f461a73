//! Application session.
//!
//! Holds the one live [`Channel`], the last control position and runs the
//! fixed-rate dispatch loop. Everything happens inside a single task, so a
//! tick can never overlap another tick or an input update.

use crate::domain::control::{ControlPosition, JoystickState};
use crate::domain::dispatch::dispatch_tick;
use crate::domain::models::{AppEvent, StatusMessage};
use crate::domain::protocol::CommandSink;
use crate::domain::settings::Settings;
use crate::infrastructure::bluetooth::{Channel, Transport};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, trace};

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Connect,
    Disconnect,
    Joystick(JoystickState),
}

pub struct Session {
    transport: Arc<dyn Transport>,
    event_sender: mpsc::UnboundedSender<AppEvent>,
    dispatch_interval: Duration,
    settle_delay: Duration,
    channel: Option<Channel>,
    position: Option<ControlPosition>,
}

impl Session {
    pub fn new(
        transport: Arc<dyn Transport>,
        event_sender: mpsc::UnboundedSender<AppEvent>,
        settings: &Settings,
    ) -> Self {
        Self {
            transport,
            event_sender,
            dispatch_interval: settings.dispatch_interval(),
            settle_delay: settings.settle_delay(),
            channel: None,
            position: None,
        }
    }

    /// Replace the channel with a fresh one and start connecting.
    pub fn connect(&mut self) {
        if let Some(mut previous) = self.channel.take() {
            previous.close();
        }
        self.channel = Some(Channel::open(
            Arc::clone(&self.transport),
            self.event_sender.clone(),
            self.settle_delay,
        ));
    }

    pub fn disconnect(&mut self) {
        match self.channel.as_mut() {
            Some(channel) => channel.close(),
            None => debug!("Disconnect requested without a channel"),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.channel
            .as_ref()
            .map(Channel::is_connected)
            .unwrap_or(false)
    }

    /// Record the latest stick reading. Last writer wins.
    pub fn update_position(&mut self, stick: &JoystickState) {
        let position = ControlPosition::from_joystick(stick);
        trace!("Control position {:?}", position);
        self.position = Some(position);
    }

    /// One dispatch tick.
    pub fn tick(&mut self) {
        let sink = self.channel.as_ref().map(|channel| channel as &dyn CommandSink);
        match dispatch_tick(self.position, sink) {
            Ok(commands) => trace!("Tick dispatched {} command(s)", commands.len()),
            Err(e) => {
                error!("Tick failed: {}", e);
                let _ = self
                    .event_sender
                    .send(AppEvent::LogMessage(StatusMessage::error(e.to_string())));
            }
        }
    }

    fn handle(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::Connect => self.connect(),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::Joystick(stick) => self.update_position(&stick),
        }
    }

    /// Run until the command queue is closed.
    ///
    /// The dispatch timer lives as long as the session. Disconnecting does
    /// not stop it, ticks are simply dropped by the channel.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<SessionCommand>) {
        info!(
            "Session started, dispatching every {} ms",
            self.dispatch_interval.as_millis()
        );
        let _ = self.event_sender.send(AppEvent::LogMessage(StatusMessage::info(
            "Type `connect` to connect...",
        )));

        let mut ticker = tokio::time::interval(self.dispatch_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.tick(),
                command = commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        if let Some(channel) = self.channel.as_mut() {
            channel.close();
        }
        info!("Session ended");
    }
}
