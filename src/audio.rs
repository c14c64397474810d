use std::{
    io::{self, Write},
    pin::Pin,
    process::Stdio,
    sync::atomic::{AtomicU64, Ordering},
};

use anyhow::Context;
use async_trait::async_trait;
use tokio::{
    fs,
    process::Command,
    sync::{Mutex, Notify, futures::Notified},
};

use crate::{appsettings::SoundSettings, error::ReminderError, scheduling::SoundPlayer};

const BELL: &[u8] = b"\x07";
const VOLUME_PLACEHOLDER: &str = "{volume}";

/// Plays the reminder through an external audio program, or rings the
/// terminal bell when none is configured or the program fails. One sound at
/// a time.
pub struct CommandSoundPlayer {
    settings: SoundSettings,
    device: Mutex<()>,
    stop: Notify,
    /// Bumped by every `stop`. A play that sees it change gives up.
    stops: AtomicU64,
}

impl CommandSoundPlayer {
    pub fn new(settings: SoundSettings) -> Self {
        Self {
            settings,
            device: Mutex::new(()),
            stop: Notify::new(),
            stops: AtomicU64::new(0),
        }
    }

    fn volume_percent(&self) -> u32 {
        (self.settings.volume.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    async fn run_command(
        &self,
        program: &str,
        stopped: Pin<&mut Notified<'_>>,
    ) -> anyhow::Result<()> {
        if let Some(file) = &self.settings.file {
            let exists = fs::try_exists(file)
                .await
                .with_context(|| format!("Could not access {}", file.display()))?;
            anyhow::ensure!(exists, "{} does not exist", file.display());
        }

        let volume = self.volume_percent().to_string();
        let mut command = Command::new(program);
        command
            .args(
                self.settings
                    .args
                    .iter()
                    .map(|arg| arg.replace(VOLUME_PLACEHOLDER, &volume)),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(file) = &self.settings.file {
            command.arg(file);
        }

        let mut child = command
            .spawn()
            .with_context(|| format!("Could not start {program:?}"))?;

        tokio::select! {
            status = child.wait() => {
                let status = status.with_context(|| format!("Lost track of {program:?}"))?;
                anyhow::ensure!(status.success(), "{program:?} exited with {status}");
                log::debug!("Sound playback completed. [command = {program}]");
            }
            _ = stopped => {
                child
                    .kill()
                    .await
                    .with_context(|| format!("Could not stop {program:?}"))?;
                log::debug!("Sound playback stopped. [command = {program}]");
            }
        }

        Ok(())
    }

    fn ring_bell(&self) -> anyhow::Result<()> {
        let mut stdout = io::stdout().lock();
        stdout.write_all(BELL).context("Could not ring the terminal bell")?;
        stdout.flush().context("Could not ring the terminal bell")?;
        Ok(())
    }
}

#[async_trait]
impl SoundPlayer for CommandSoundPlayer {
    async fn play(&self) -> Result<(), ReminderError> {
        if !self.settings.enabled {
            log::debug!("Sound is disabled, skipping playback.");
            return Ok(());
        }
        if self.settings.volume <= 0.0 {
            log::debug!(
                "Sound is muted, skipping playback. [volume = {}]",
                self.settings.volume
            );
            return Ok(());
        }

        let generation = self.stops.load(Ordering::SeqCst);
        let _device = self.device.lock().await;

        let stopped = self.stop.notified();
        tokio::pin!(stopped);
        stopped.as_mut().enable();
        if self.stops.load(Ordering::SeqCst) != generation {
            log::debug!("Sound playback stopped before it started.");
            return Ok(());
        }

        if let Some(program) = &self.settings.command {
            match self.run_command(program, stopped.as_mut()).await {
                Ok(()) => return Ok(()),
                Err(error) => log::warn!(
                    "Sound command failed, falling back to the terminal bell. [command = {program}, error = {error:#}]"
                ),
            }
        }

        self.ring_bell().map_err(ReminderError::Playback)
    }

    fn stop(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
        self.stop.notify_waiters();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::{
        path::{Path, PathBuf},
        sync::Arc,
        time::{Duration, Instant},
    };

    use super::*;

    fn player(command: &str, args: &[&str], file: Option<PathBuf>) -> CommandSoundPlayer {
        CommandSoundPlayer::new(SoundSettings {
            enabled: true,
            file,
            command: Some(command.to_owned()),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            ..Default::default()
        })
    }

    /// Runs `script` through `sh -c`. The sound file, if any, lands in `$0`.
    fn shell_player(script: &str, file: Option<PathBuf>) -> CommandSoundPlayer {
        player("sh", &["-c", script], file)
    }

    fn touch(marker: &Path) -> String {
        format!("touch {}", marker.display())
    }

    #[tokio::test]
    async fn disabled_player_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let player = CommandSoundPlayer::new(SoundSettings {
            enabled: false,
            ..shell_player(&touch(&marker), None).settings
        });

        assert!(player.play().await.is_ok());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn zero_volume_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let player = CommandSoundPlayer::new(SoundSettings {
            volume: 0.0,
            ..shell_player(&touch(&marker), None).settings
        });

        assert!(player.play().await.is_ok());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn volume_is_substituted_into_args() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("volume");
        let script = format!("printf %s {{volume}} > {}", output.display());
        let player = CommandSoundPlayer::new(SoundSettings {
            volume: 0.5,
            ..shell_player(&script, None).settings
        });

        player.play().await.unwrap();

        assert_eq!(std::fs::read_to_string(output).unwrap(), "50");
    }

    #[tokio::test]
    async fn successful_command_is_ok() {
        assert!(player("true", &[], None).play().await.is_ok());
    }

    #[tokio::test]
    async fn failing_command_falls_back_to_the_bell() {
        assert!(player("false", &[], None).play().await.is_ok());
    }

    #[tokio::test]
    async fn missing_program_falls_back_to_the_bell() {
        assert!(
            player("rest-reminder-no-such-player", &[], None)
                .play()
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn sound_file_is_passed_last() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let sound = tempfile::NamedTempFile::new().unwrap();
        let script = format!("test -f \"$0\" && {}", touch(&marker));

        shell_player(&script, Some(sound.path().to_owned()))
            .play()
            .await
            .unwrap();

        assert!(marker.exists());
    }

    #[tokio::test]
    async fn missing_sound_file_rings_the_bell_instead() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let missing = dir.path().join("bell.wav");

        let played = shell_player(&touch(&marker), Some(missing)).play().await;

        assert!(played.is_ok());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn stop_cuts_playback_short() {
        let player = Arc::new(player("sleep", &["30"], None));
        let playing = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play().await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        player.stop();

        let played = tokio::time::timeout(Duration::from_secs(5), playing)
            .await
            .expect("playback should stop")
            .unwrap();
        assert!(played.is_ok());
    }

    #[tokio::test]
    async fn stop_also_cancels_playback_waiting_for_the_device() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("second");
        let script = format!(
            "if [ -e {0}.first ]; then touch {0}; else touch {0}.first; sleep 30; fi",
            marker.display()
        );
        let player = Arc::new(shell_player(&script, None));

        let first = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play().await })
        };
        tokio::time::sleep(Duration::from_millis(200)).await;
        let second = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.play().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        player.stop();

        let (first, second) = tokio::time::timeout(Duration::from_secs(5), async {
            (first.await.unwrap(), second.await.unwrap())
        })
        .await
        .expect("both plays should stop");
        assert!(first.is_ok() && second.is_ok());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn stop_before_play_does_not_mute_later_plays() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("played");
        let player = shell_player(&touch(&marker), None);

        player.stop();
        player.play().await.unwrap();

        assert!(marker.exists());
    }

    #[tokio::test]
    async fn overlapping_plays_take_turns() {
        let player = Arc::new(player("sleep", &["0.2"], None));
        let started = Instant::now();

        let (first, second) = tokio::join!(player.play(), player.play());

        assert!(first.is_ok() && second.is_ok());
        assert!(started.elapsed() >= Duration::from_millis(400));
    }
}
