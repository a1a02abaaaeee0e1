// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Integration tests for the serial backend against an in-memory UDIN card.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use relayfs::device::{RelayDevice, SerialRelayDevice};
use relayfs::protocol::serial::SerialConfig;
use relayfs::types::{ChannelIndex, RelayState};
use relayfs::{FsError, RegistryState, RelayFs, SwitchOutcome};

// ============================================================================
// Fake card
// ============================================================================

const UDIN_8R: &str = "UDIN-8R 8 x Relay V1.0";

#[derive(Debug, Default)]
struct CardState {
    id: String,
    mask: u32,
    /// Relay index that ignores switch commands.
    stuck: Option<u8>,
    /// Stop answering after the next switch command.
    mute_after_switch: bool,
    /// Echo switch commands with a trailing `?`.
    garble_switch_echo: bool,
    muted: bool,
    input: Vec<u8>,
    output: VecDeque<u8>,
    commands: Vec<String>,
}

impl CardState {
    fn execute(&mut self, token: &str) {
        self.commands.push(token.to_string());
        if self.muted {
            return;
        }
        if self.garble_switch_echo && token.starts_with(['n', 'f']) {
            self.reply(&format!("{token}?"));
        } else {
            self.reply(token);
        }

        match token {
            "?" => {
                let id = self.id.clone();
                self.reply(&id);
            }
            "s0" => {
                let mask = self.mask.to_string();
                self.reply(&mask);
            }
            "r0" => self.mask = 0,
            _ => {
                let (verb, number) = token.split_at(1);
                let Ok(number) = number.parse::<u8>() else {
                    return;
                };
                let bit = number - 1;
                if self.stuck != Some(bit) {
                    match verb {
                        "n" => self.mask |= 1 << bit,
                        "f" => self.mask &= !(1 << bit),
                        _ => {}
                    }
                }
                if self.mute_after_switch {
                    self.muted = true;
                }
            }
        }
    }

    fn reply(&mut self, line: &str) {
        self.output.extend(line.bytes());
        self.output.extend(b"\r\n");
    }
}

/// A UDIN card on the other end of a serial line.
#[derive(Clone)]
struct FakeCard {
    state: Arc<Mutex<CardState>>,
}

impl FakeCard {
    fn new(id: &str, mask: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(CardState {
                id: id.to_string(),
                mask,
                ..CardState::default()
            })),
        }
    }

    fn udin() -> Self {
        Self::new(UDIN_8R, 0)
    }

    fn stuck(self, index: u8) -> Self {
        self.state.lock().stuck = Some(index);
        self
    }

    fn mute_after_switch(self) -> Self {
        self.state.lock().mute_after_switch = true;
        self
    }

    fn garble_switch_echo(self) -> Self {
        self.state.lock().garble_switch_echo = true;
        self
    }

    fn mask(&self) -> u32 {
        self.state.lock().mask
    }

    fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    fn unmute(&self) {
        let mut state = self.state.lock();
        state.muted = false;
        state.mute_after_switch = false;
    }
}

impl Read for FakeCard {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        if state.output.is_empty() {
            return Err(io::ErrorKind::WouldBlock.into());
        }
        let n = buf.len().min(state.output.len());
        for (slot, byte) in buf.iter_mut().zip(state.output.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for FakeCard {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.lock();
        for &byte in buf {
            if byte == b'\r' {
                let token = String::from_utf8_lossy(&state.input).into_owned();
                state.input.clear();
                state.execute(&token);
            } else {
                state.input.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn config() -> SerialConfig {
    SerialConfig::new("/dev/ttyUSB0")
        .with_poll_interval(Duration::from_millis(1))
        .with_read_timeout(Duration::from_millis(50))
}

fn device(card: &FakeCard, config: SerialConfig) -> SerialRelayDevice {
    let card = card.clone();
    SerialRelayDevice::with_opener(config, move |_| Ok(Box::new(card.clone())))
}

fn mounted(card: &FakeCard) -> RelayFs<SerialRelayDevice> {
    let fs = RelayFs::new(device(card, config()));
    fs.init();
    fs
}

fn names(fs: &RelayFs<SerialRelayDevice>) -> Vec<String> {
    fs.readdir("/")
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

fn idx(i: u8) -> ChannelIndex {
    ChannelIndex::new(i).unwrap()
}

// ============================================================================
// Identification
// ============================================================================

mod identification {
    use super::*;

    #[test]
    fn udin_8r_yields_eight_channels() {
        let card = FakeCard::udin();
        let fs = mounted(&card);

        assert_eq!(fs.device().channel_count(), 8);
        assert_eq!(
            names(&fs),
            [".", "..", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8"]
        );
        assert_eq!(fs.device().model().map(|m| m.relays), Some(8));
        assert_eq!(card.commands(), ["?", "r0", "s0"]);
    }

    #[test]
    fn unknown_card_yields_empty_directory() {
        let card = FakeCard::new("UDIN-4R 4 x Relay V1.0", 0);
        let fs = mounted(&card);

        assert_eq!(fs.device().channel_count(), 0);
        assert_eq!(names(&fs), [".", ".."]);
        assert_eq!(fs.getattr("/r1"), Err(FsError::NotFound));
        assert_eq!(fs.device().status(), RegistryState::Offline);
        // Nothing is sent after the identification fails.
        assert_eq!(card.commands(), ["?"]);
    }

    #[test]
    fn reset_switches_everything_off() {
        let card = FakeCard::new(UDIN_8R, 0b101);
        let fs = mounted(&card);

        assert_eq!(card.mask(), 0);
        assert_eq!(fs.read("/r1", 1, 0).unwrap(), b"0");
    }

    #[test]
    fn without_reset_initial_state_is_seeded() {
        let card = FakeCard::new(UDIN_8R, 0b101);
        let fs = RelayFs::new(device(&card, config().with_reset_on_init(false)));
        fs.init();

        assert_eq!(fs.read("/r1", 1, 0).unwrap(), b"1");
        assert_eq!(fs.read("/r2", 1, 0).unwrap(), b"0");
        assert_eq!(fs.read("/r3", 1, 0).unwrap(), b"1");
        assert_eq!(card.commands(), ["?", "s0"]);
    }
}

// ============================================================================
// Switching
// ============================================================================

mod switching {
    use super::*;

    #[test]
    fn channel_three_sets_bit_two() {
        let card = FakeCard::udin();
        let fs = mounted(&card);

        assert_eq!(fs.write("/r3", b"1", 0), Ok(1));
        assert_eq!(card.mask(), 0b100);
        assert_eq!(fs.read("/r3", 1, 0).unwrap(), b"1");
        assert_eq!(card.commands()[3..], ["n3", "s0"]);
        assert_eq!(names(&fs).len(), 10);
    }

    #[test]
    fn anything_but_one_switches_off() {
        let card = FakeCard::udin();
        let fs = mounted(&card);

        fs.write("/r2", b"1", 0).unwrap();
        fs.write("/r2", b"x", 0).unwrap();
        assert_eq!(card.mask(), 0);
        assert_eq!(fs.read("/r2", 1, 0).unwrap(), b"0");
    }

    #[test]
    fn repeated_write_is_suppressed() {
        let card = FakeCard::udin();
        let fs = mounted(&card);

        fs.write("/r3", b"1", 0).unwrap();
        let first = fs.getattr("/r3").unwrap().mtime;
        let sent = card.commands().len();

        std::thread::sleep(Duration::from_millis(5));
        let outcome = fs.switch_channel(idx(2), RelayState::On);
        assert!(matches!(outcome, SwitchOutcome::Unchanged));
        fs.write("/r3", b"1", 0).unwrap();

        assert_eq!(fs.getattr("/r3").unwrap().mtime, first);
        assert_eq!(card.commands().len(), sent);
    }

    #[test]
    fn switch_moves_only_its_own_timestamp() {
        let card = FakeCard::udin();
        let fs = mounted(&card);
        let before = fs.getattr("/r1").unwrap().mtime;

        std::thread::sleep(Duration::from_millis(5));
        fs.write("/r2", b"1", 0).unwrap();

        assert_eq!(fs.getattr("/r1").unwrap().mtime, before);
        assert!(fs.getattr("/r2").unwrap().mtime > before);
    }
}

// ============================================================================
// Consistency
// ============================================================================

mod consistency {
    use super::*;

    #[test]
    fn stuck_relay_hides_all_channels() {
        let card = FakeCard::udin().stuck(2);
        let fs = mounted(&card);

        let outcome = fs.switch_channel(idx(2), RelayState::On);
        assert!(matches!(outcome, SwitchOutcome::Inconsistent(ref m) if m == &[idx(2)]));

        assert_eq!(fs.device().channel_count(), 0);
        assert_eq!(names(&fs), [".", ".."]);
        assert_eq!(fs.read("/r1", 1, 0), Err(FsError::NotFound));
        assert_eq!(fs.write("/r1", b"1", 0), Err(FsError::NotFound));
        assert!(matches!(
            fs.device().status(),
            RegistryState::Degraded { .. }
        ));
    }

    #[test]
    fn write_to_stuck_relay_reports_success() {
        let card = FakeCard::udin().stuck(0);
        let fs = mounted(&card);

        assert_eq!(fs.write("/r1", b"1", 0), Ok(1));
        assert_eq!(fs.getattr("/r1"), Err(FsError::NotFound));
    }

    #[test]
    fn failed_verification_hides_all_channels() {
        let card = FakeCard::udin().mute_after_switch();
        let fs = mounted(&card);

        let outcome = fs.switch_channel(idx(4), RelayState::On);
        assert!(matches!(outcome, SwitchOutcome::Inconsistent(_)));
        assert_eq!(names(&fs), [".", ".."]);
    }

    #[test]
    fn lost_echo_of_applied_switch_hides_all_channels() {
        let card = FakeCard::udin().garble_switch_echo();
        let fs = mounted(&card);

        assert_eq!(fs.write("/r3", b"1", 0), Ok(1));
        assert_eq!(card.mask(), 0b100);
        assert_eq!(card.commands()[3..], ["n3", "s0"]);
        assert_eq!(names(&fs), [".", ".."]);
        assert!(matches!(
            fs.device().status(),
            RegistryState::Degraded { ref mismatched, .. } if mismatched == &[idx(2)]
        ));
    }

    #[test]
    fn lost_echo_of_ignored_switch_keeps_channels() {
        let card = FakeCard::udin().garble_switch_echo().stuck(2);
        let fs = mounted(&card);

        let outcome = fs.switch_channel(idx(2), RelayState::On);
        assert!(matches!(outcome, SwitchOutcome::Failed(_)));
        assert_eq!(card.mask(), 0);
        assert_eq!(fs.read("/r3", 1, 0).unwrap(), b"0");
        assert_eq!(fs.device().status(), RegistryState::Operational);
    }

    #[test]
    fn remount_recovers_from_degraded() {
        let card = FakeCard::udin().mute_after_switch();
        let fs = mounted(&card);
        fs.switch_channel(idx(0), RelayState::On);
        assert_eq!(fs.device().channel_count(), 0);

        card.unmute();
        fs.destroy();
        fs.init();

        assert_eq!(fs.device().channel_count(), 8);
        assert!(fs.device().status() == RegistryState::Operational);
    }
}

// ============================================================================
// Concurrency
// ============================================================================

mod concurrency {
    use super::*;

    #[test]
    fn parallel_writes_are_serialised() {
        let card = FakeCard::udin();
        let fs = Arc::new(mounted(&card));

        let handles: Vec<_> = (1..=8)
            .map(|n| {
                let fs = Arc::clone(&fs);
                std::thread::spawn(move || fs.write(&format!("/r{n}"), b"1", 0))
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), Ok(1));
        }

        assert_eq!(card.mask(), 0xff);
        assert_eq!(fs.device().status(), RegistryState::Operational);
        assert_eq!(names(&fs).len(), 10);

        // Every switch is directly followed by its own verification query.
        let commands = card.commands();
        let switches = &commands[3..];
        assert_eq!(switches.len(), 16);
        for pair in switches.chunks(2) {
            assert!(pair[0].starts_with('n'), "unexpected command {pair:?}");
            assert_eq!(pair[1], "s0");
        }
        for n in 1..=8 {
            assert_eq!(fs.read(&format!("/r{n}"), 1, 0).unwrap(), b"1");
        }
    }
}
