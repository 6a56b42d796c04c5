//! Application-level configuration loading: participant names, question bank, reward and timers.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{info, warn};

use crate::state::game::{GameKind, Seat};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PAIR_PLAY_CONFIG_PATH";

const DEFAULT_PARTICIPANTS: [&str; 2] = ["Guille", "Delfina"];
const DEFAULT_REWARD_TITLE: &str = "Nuestra playlist";
const DEFAULT_REWARD_URL: &str = "https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M";
const DEFAULT_GUESS_TIMER_SECS: u64 = 120;
const DEFAULT_MAX_SNAPSHOT_BYTES: usize = 512 * 1024;
const DEFAULT_WAIT_SECS: u64 = 25;
const MAX_WAIT_SECS: u64 = 60;
/// Drawful cycles through this many words so both participants draw the same ones.
const DRAWFUL_WORD_CYCLE: usize = 3;

/// Link revealed once every game is completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reward {
    /// Label shown next to the link.
    pub title: String,
    /// Target URL.
    pub url: String,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    participants: [String; 2],
    questions: IndexMap<GameKind, Vec<String>>,
    reward: Reward,
    guess_timer: Option<Duration>,
    max_snapshot_bytes: usize,
    default_wait: Duration,
    max_wait: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        first = %app_config.participants[0],
                        second = %app_config.participants[1],
                        "loaded configuration"
                    );
                    app_config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Display name bound to `seat`.
    pub fn participant_name(&self, seat: Seat) -> &str {
        match seat {
            Seat::First => &self.participants[0],
            Seat::Second => &self.participants[1],
        }
    }

    /// Seat of the participant called `name` (case-insensitive).
    pub fn seat_for(&self, name: &str) -> Option<Seat> {
        let name = name.trim();
        Seat::BOTH
            .into_iter()
            .find(|seat| self.participant_name(*seat).eq_ignore_ascii_case(name))
    }

    /// Full question bank in menu order.
    pub fn questions(&self) -> &IndexMap<GameKind, Vec<String>> {
        &self.questions
    }

    /// Prompt shown for `round` of `game`.
    ///
    /// Drawful cycles through its first [`DRAWFUL_WORD_CYCLE`] words; the other games have
    /// one prompt per round.
    pub fn prompt(&self, game: GameKind, round: u8) -> Option<String> {
        let prompts = self.questions.get(&game)?;
        let index = usize::from(round.checked_sub(1)?);
        let prompt = match game {
            GameKind::Drawful if !prompts.is_empty() => {
                prompts.get(index % prompts.len().min(DRAWFUL_WORD_CYCLE))
            }
            _ => prompts.get(index),
        };
        prompt.cloned()
    }

    /// Reward unlocked after the last game.
    pub fn reward(&self) -> &Reward {
        &self.reward
    }

    /// Countdown for drawful guesses; `None` when disabled.
    pub fn guess_timer(&self) -> Option<Duration> {
        self.guess_timer
    }

    /// Largest accepted drawing snapshot, in bytes.
    pub fn max_snapshot_bytes(&self) -> usize {
        self.max_snapshot_bytes
    }

    /// Resolve the timeout of a long-poll wait, applying the default and the cap.
    pub fn wait_timeout(&self, requested_secs: Option<u64>) -> Duration {
        requested_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_wait)
            .min(self.max_wait)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            participants: DEFAULT_PARTICIPANTS.map(str::to_owned),
            questions: default_questions(),
            reward: Reward {
                title: DEFAULT_REWARD_TITLE.into(),
                url: DEFAULT_REWARD_URL.into(),
            },
            guess_timer: Some(Duration::from_secs(DEFAULT_GUESS_TIMER_SECS)),
            max_snapshot_bytes: DEFAULT_MAX_SNAPSHOT_BYTES,
            default_wait: Duration::from_secs(DEFAULT_WAIT_SECS),
            max_wait: Duration::from_secs(MAX_WAIT_SECS),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    participants: Option<[String; 2]>,
    questions: IndexMap<GameKind, Vec<String>>,
    reward: Option<RawReward>,
    guess_timer_secs: Option<u64>,
    max_snapshot_bytes: Option<usize>,
    default_wait_secs: Option<u64>,
    max_wait_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawReward {
    title: String,
    url: String,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();

        let participants = match value.participants {
            Some([first, second]) => {
                let (first, second) = (first.trim().to_owned(), second.trim().to_owned());
                if first.is_empty() || second.is_empty() || first.eq_ignore_ascii_case(&second) {
                    warn!("participant names must be distinct and non-empty; using defaults");
                    defaults.participants
                } else {
                    [first, second]
                }
            }
            None => defaults.participants,
        };

        let mut questions = defaults.questions;
        for (game, prompts) in value.questions {
            let prompts: Vec<String> = prompts
                .into_iter()
                .map(|prompt| prompt.trim().to_owned())
                .filter(|prompt| !prompt.is_empty())
                .collect();
            if prompts.len() < required_prompts(game) {
                warn!(
                    %game,
                    count = prompts.len(),
                    "not enough prompts configured; keeping built-in questions"
                );
                continue;
            }
            questions.insert(game, prompts);
        }

        let reward = value
            .reward
            .map(|raw| Reward {
                title: raw.title,
                url: raw.url,
            })
            .unwrap_or(defaults.reward);

        let guess_timer = match value.guess_timer_secs {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => defaults.guess_timer,
        };

        let max_wait = value
            .max_wait_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.max_wait);
        let default_wait = value
            .default_wait_secs
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_wait)
            .min(max_wait);

        Self {
            participants,
            questions,
            reward,
            guess_timer,
            max_snapshot_bytes: value
                .max_snapshot_bytes
                .unwrap_or(defaults.max_snapshot_bytes),
            default_wait,
            max_wait,
        }
    }
}

/// Drawful cycles through its words, so one is enough; other games need one per round.
fn required_prompts(game: GameKind) -> usize {
    match game {
        GameKind::Drawful => 1,
        other => usize::from(other.max_rounds()),
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in question bank shipped with the binary.
fn default_questions() -> IndexMap<GameKind, Vec<String>> {
    let bank: [(GameKind, &[&str]); 4] = [
        (
            GameKind::Top10,
            &[
                "Top 10 momentos en nuestra relación",
                "Top 10 cosas que te gustan de le otre",
                "Top 10 lugares que queremos visitar",
            ],
        ),
        (
            GameKind::PredictFuture,
            &[
                "Cómo imaginás un domingo perfecto en 10 años?",
                "Qué/cuántos animales imaginás que van a vivir con nosotros en 10 años?",
                "Cuál va a ser nuestro lugar favorito para vacacionar en 10 años?",
            ],
        ),
        (
            GameKind::Drawful,
            &[
                "Olivia",
                "Brownie",
                "Oni",
                "Nuestra primera cita",
                "Nuestro casamiento",
                "Nuestra casa",
                "Un verano juntes",
                "Navidad juntes",
                "Unas vacaciones juntes",
                "Nosotres y los animales",
            ],
        ),
        (
            GameKind::WouldYouDo,
            &[
                "Te meterías en una bañera llena de gelatina por le otre?",
                "Abrazarías a le otre si está completamente cubierte de barro y te lo pide?",
                "Serías la parte de atrás de un disfraz de caballo con le otre?",
                "Harías un Naruto run en público cuando con le otre cuando vayamos a Japón?",
                "Lamerías a Oni, Brownie y Olivia si eso le curara la gripe a le otre?",
            ],
        ),
    ];

    bank.into_iter()
        .map(|(game, prompts)| (game, prompts.iter().map(|p| (*p).to_owned()).collect()))
        .collect()
}
