//! Two-step source selection: pick an alarm group, then a station and count.
//!
//! The host renders each [`Form`] and calls back with the user's input.
//! Step one fetches the feed once and offers the distinct `beredskabsID`
//! values; step two refetches, offers the stations seen for the chosen group
//! and the item count bound, and completes with [`FeedSettings`]. A fetch
//! failure re-presents the same step with [`FormError::FetchError`]; the
//! wizard does not advance until a step succeeds.

use crate::feed::{
    distinct_identifiers, distinct_stations, FeedSource, Fetcher, RawFeedEntry,
    DEFAULT_ITEM_COUNT, MAX_ITEM_COUNT, MIN_ITEM_COUNT,
};
use crate::pipeline::{fetch_parsed, FeedSettings};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    SelectGroup,
    SelectDetail,
}

/// Why a step was re-presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormError {
    /// The feed could not be fetched; retry the same step.
    FetchError,
    IdentifierRequired,
    UnknownIdentifier,
    UnknownStation,
    CountOutOfRange,
}

/// Bounds and default for the item count field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountField {
    pub min: u8,
    pub max: u8,
    pub default: u8,
}

/// A step waiting for user input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Form {
    pub step: WizardStep,
    pub choices: Vec<String>,
    pub default_choice: Option<String>,
    /// Present on the detail step only.
    pub count: Option<CountField>,
    pub error: Option<FormError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Form(Form),
    Complete(FeedSettings),
}

impl StepOutcome {
    pub fn form(&self) -> Option<&Form> {
        match self {
            StepOutcome::Form(form) => Some(form),
            StepOutcome::Complete(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInput {
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailInput {
    /// Empty means "all stations".
    pub station: String,
    pub count: i64,
}

/// Initial setup, or reconfiguring an existing source (defaults come from
/// the current settings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardMode {
    Setup,
    Reconfigure(FeedSettings),
}

pub struct Wizard {
    fetcher: Fetcher,
    feed_url: String,
    mode: WizardMode,
    step: WizardStep,
    /// Identifiers from the first group-step fetch; `None` until it succeeds.
    identifiers: Option<Vec<String>>,
    selected: Option<String>,
}

impl Wizard {
    pub fn setup(fetcher: Fetcher, feed_url: impl Into<String>) -> Self {
        Self::with_mode(fetcher, feed_url.into(), WizardMode::Setup)
    }

    pub fn reconfigure(fetcher: Fetcher, current: FeedSettings) -> Self {
        let feed_url = current.feed_url.clone();
        Self::with_mode(fetcher, feed_url, WizardMode::Reconfigure(current))
    }

    /// Starts in `mode`. Reconfiguring fetches from the current settings'
    /// feed URL; setup uses `feed_url`.
    pub fn start(fetcher: Fetcher, feed_url: impl Into<String>, mode: WizardMode) -> Self {
        match mode {
            WizardMode::Setup => Self::setup(fetcher, feed_url),
            WizardMode::Reconfigure(current) => Self::reconfigure(fetcher, current),
        }
    }

    pub fn mode(&self) -> &WizardMode {
        &self.mode
    }

    fn with_mode(fetcher: Fetcher, feed_url: String, mode: WizardMode) -> Self {
        Self {
            fetcher,
            feed_url,
            mode,
            step: WizardStep::SelectGroup,
            identifiers: None,
            selected: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn selected_identifier(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    fn current(&self) -> Option<&FeedSettings> {
        match &self.mode {
            WizardMode::Setup => None,
            WizardMode::Reconfigure(settings) => Some(settings),
        }
    }

    async fn load_entries(&self) -> Option<Vec<RawFeedEntry>> {
        match fetch_parsed(&self.fetcher, &FeedSource::new(self.feed_url.as_str())).await {
            Ok(parsed) => Some(parsed.entries),
            Err(e) => {
                tracing::warn!(step = ?self.step, error = %e, "Wizard could not fetch the feed");
                None
            }
        }
    }

    /// Step one. Without input, presents the alarm groups in the feed; with
    /// input, records the choice and presents step two.
    pub async fn select_group(&mut self, input: Option<GroupInput>) -> StepOutcome {
        let identifiers = match self.identifiers.clone() {
            Some(identifiers) => identifiers,
            None => match self.load_entries().await {
                Some(entries) => {
                    let identifiers = distinct_identifiers(&entries);
                    self.identifiers = Some(identifiers.clone());
                    identifiers
                }
                None => return self.group_form(Some(FormError::FetchError)),
            },
        };

        let Some(input) = input else {
            return self.group_form(None);
        };

        let identifier = input.identifier.trim().to_string();
        if identifier.is_empty() {
            return self.group_form(Some(FormError::IdentifierRequired));
        }
        if !identifiers.is_empty() && !identifiers.contains(&identifier) {
            return self.group_form(Some(FormError::UnknownIdentifier));
        }

        tracing::debug!(identifier = %identifier, "Alarm group selected");
        self.selected = Some(identifier);
        self.step = WizardStep::SelectDetail;
        self.select_detail(None).await
    }

    /// Step two. Without input, presents the stations for the chosen group and
    /// the count field; with input, completes the wizard.
    pub async fn select_detail(&mut self, input: Option<DetailInput>) -> StepOutcome {
        let Some(identifier) = self.selected.clone() else {
            return self.group_form(None);
        };

        let Some(entries) = self.load_entries().await else {
            return StepOutcome::Form(Form {
                step: WizardStep::SelectDetail,
                choices: Vec::new(),
                default_choice: None,
                count: None,
                error: Some(FormError::FetchError),
            });
        };
        let stations = distinct_stations(&entries, Some(&identifier));

        let Some(input) = input else {
            return self.detail_form(stations, None);
        };

        let station = input.station.trim().to_string();
        if !station.is_empty() && !stations.is_empty() && !stations.contains(&station) {
            return self.detail_form(stations, Some(FormError::UnknownStation));
        }
        let count = match u8::try_from(input.count) {
            Ok(n) if (MIN_ITEM_COUNT..=MAX_ITEM_COUNT).contains(&n) => n,
            _ => return self.detail_form(stations, Some(FormError::CountOutOfRange)),
        };

        let local_filter = self.current().is_some_and(|c| c.local_filter);
        let settings = FeedSettings {
            feed_url: self.feed_url.clone(),
            identifier,
            station,
            count,
            local_filter,
        };
        tracing::info!(source = %settings.unique_id(), count = count, "Wizard complete");
        StepOutcome::Complete(settings)
    }

    fn group_form(&self, error: Option<FormError>) -> StepOutcome {
        let choices = self.identifiers.clone().unwrap_or_default();
        let default_choice = self
            .current()
            .map(|c| c.identifier.clone())
            .filter(|id| !id.is_empty())
            .or_else(|| choices.first().cloned());

        StepOutcome::Form(Form {
            step: WizardStep::SelectGroup,
            choices,
            default_choice,
            count: None,
            error,
        })
    }

    fn detail_form(&self, stations: Vec<String>, error: Option<FormError>) -> StepOutcome {
        let default_choice = self
            .current()
            .map(|c| c.station.clone())
            .filter(|s| !s.is_empty())
            .or_else(|| stations.first().cloned());
        let default_count = self.current().map_or(DEFAULT_ITEM_COUNT, |c| c.count);

        StepOutcome::Form(Form {
            step: WizardStep::SelectDetail,
            choices: stations,
            default_choice,
            count: Some(CountField {
                min: MIN_ITEM_COUNT,
                max: MAX_ITEM_COUNT,
                default: default_count,
            }),
            error,
        })
    }
}
