//! Wire formats shared by the listing page, the detail page and the remote title page.
//!
//! Every browsing context involved in a sync only learns what to do from its own URL, so
//! these encodings are the whole cross-context contract besides the result store keys.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

pub const SYNC_FRAGMENT_PREFIX: &str = "sync-";
pub const AUTO_SYNC_PREFIX: &str = "auto-sync-";
pub const RESULT_KEY_PREFIX: &str = "result-";
/// Title prefix a continuation page sets once its own batch has settled.
pub const COMPLETION_TITLE_MARKER: &str = "[已完成] ";
pub const REMOTE_TITLE_BASE: &str = "https://www.imdb.com/title/";
pub const ORIGIN_SUBJECT_BASE: &str = "https://movie.douban.com/subject/";

const BATCH_PREFIX: &str = "batch-";
const FROM_REMOTE_PARAM: &str = "from-imdb";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("missing `{0}` prefix")]
    MissingPrefix(&'static str),
    #[error("malformed {field}: {value:?}")]
    Malformed { field: &'static str, value: String },
    #[error("rating out of range: {0}")]
    RatingOutOfRange(u8),
    #[error("score out of range: {0}")]
    ScoreOutOfRange(u8),
    #[error("unknown sync target: {0:?}")]
    UnknownTarget(String),
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("not a return-trip url")]
    NotReturnTrip,
}

impl ProtocolError {
    fn malformed(field: &'static str, value: &str) -> Self {
        Self::Malformed {
            field,
            value: value.to_string(),
        }
    }
}

/// A 1 to 5 star rating as shown on the origin site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rating(u8);

impl Rating {
    /// Used when a listing entry carries no rating indicator.
    pub const DEFAULT: Rating = Rating(5);

    pub fn new(stars: u8) -> Result<Self, ProtocolError> {
        if (1..=5).contains(&stars) {
            Ok(Self(stars))
        } else {
            Err(ProtocolError::RatingOutOfRange(stars))
        }
    }

    pub fn stars(self) -> u8 {
        self.0
    }

    /// The remote site rates on a 10 point scale.
    pub fn score(self) -> Score {
        Score(self.0 * 2)
    }
}

impl Default for Rating {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 1 to 10 point score on the remote site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score(u8);

impl Score {
    pub fn new(points: u8) -> Result<Self, ProtocolError> {
        if (1..=10).contains(&points) {
            Ok(Self(points))
        } else {
            Err(ProtocolError::ScoreOutOfRange(points))
        }
    }

    pub fn points(self) -> u8 {
        self.0
    }

    pub fn to_rating(self) -> Rating {
        Rating(self.0.div_ceil(2).clamp(1, 5))
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncTarget {
    /// Mark as watched and rate.
    Rating,
    /// Add to the watchlist.
    Watchlist,
}

impl SyncTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            SyncTarget::Rating => "rating",
            SyncTarget::Watchlist => "watchlist",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SyncTarget::Rating => "watched (rating)",
            SyncTarget::Watchlist => "want to watch (watchlist)",
        }
    }
}

impl fmt::Display for SyncTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncTarget {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rating" => Ok(SyncTarget::Rating),
            "watchlist" => Ok(SyncTarget::Watchlist),
            other => Err(ProtocolError::UnknownTarget(other.to_string())),
        }
    }
}

/// Identifier of one batch, `batch-<millis>` (or `batch-auto-<millis>` for continuation pages).
///
/// It always contains hyphens, so decoders must split around it from the right.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchId(String);

impl BatchId {
    pub fn from_millis(now_ms: u64) -> Self {
        Self(format!("{BATCH_PREFIX}{now_ms}"))
    }

    pub fn auto(now_ms: u64) -> Self {
        Self(format!("{BATCH_PREFIX}auto-{now_ms}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for BatchId {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let valid = s
            .strip_prefix(BATCH_PREFIX)
            .is_some_and(|rest| !rest.is_empty())
            && s
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(ProtocolError::malformed("batch id", s))
        }
    }
}

/// One item of one batch; the unit of result-store ownership.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchRef {
    pub batch_id: BatchId,
    pub index: usize,
}

impl BatchRef {
    pub fn new(batch_id: BatchId, index: usize) -> Self {
        Self { batch_id, index }
    }

    pub fn result_key(&self) -> String {
        result_key(&self.batch_id, self.index)
    }

    fn parse_tail(tail: &str) -> Result<Self, ProtocolError> {
        let (batch, index) = tail
            .rsplit_once('-')
            .ok_or_else(|| ProtocolError::malformed("batch reference", tail))?;
        let index = index
            .parse()
            .map_err(|_| ProtocolError::malformed("item index", index))?;
        Ok(Self::new(batch.parse()?, index))
    }
}

/// Result store key for one `(batch, item)` pair.
pub fn result_key(batch_id: &BatchId, index: usize) -> String {
    format!("{RESULT_KEY_PREFIX}{batch_id}-{index}")
}

/// Outcome tag written by the action runner and carried back on the return trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OutcomeTag {
    Success,
    AlreadyInList,
    FailedTimeout,
    FailedNoButton,
    NoImdbId,
    Other(String),
}

impl OutcomeTag {
    pub fn as_str(&self) -> &str {
        match self {
            OutcomeTag::Success => "success",
            OutcomeTag::AlreadyInList => "already-in-list",
            OutcomeTag::FailedTimeout => "failed-timeout",
            OutcomeTag::FailedNoButton => "failed-no-button",
            OutcomeTag::NoImdbId => "no-imdb-id",
            OutcomeTag::Other(tag) => tag,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, OutcomeTag::Success | OutcomeTag::AlreadyInList)
    }
}

impl From<&str> for OutcomeTag {
    fn from(tag: &str) -> Self {
        match tag {
            "success" => OutcomeTag::Success,
            "already-in-list" => OutcomeTag::AlreadyInList,
            "failed-timeout" => OutcomeTag::FailedTimeout,
            "failed-no-button" => OutcomeTag::FailedNoButton,
            "no-imdb-id" => OutcomeTag::NoImdbId,
            other => OutcomeTag::Other(other.to_string()),
        }
    }
}

impl fmt::Display for OutcomeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `#sync-<rating>-<target>[-<batchId>-<index>]`, appended to a detail page URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFragment {
    pub rating: Rating,
    pub target: SyncTarget,
    pub batch: Option<BatchRef>,
}

impl SyncFragment {
    pub fn encode(&self) -> String {
        let mut out = format!(
            "#{SYNC_FRAGMENT_PREFIX}{}-{}",
            self.rating.stars(),
            self.target
        );
        if let Some(batch) = &self.batch {
            out.push_str(&format!("-{}-{}", batch.batch_id, batch.index));
        }
        out
    }

    /// Replaces any existing fragment of `url` with this one.
    pub fn apply_to(&self, url: &str) -> String {
        let base = url.split_once('#').map_or(url, |(base, _)| base);
        format!("{base}{}", self.encode())
    }

    pub fn decode(fragment: &str) -> Result<Self, ProtocolError> {
        let body = fragment
            .trim_start_matches('#')
            .strip_prefix(SYNC_FRAGMENT_PREFIX)
            .ok_or(ProtocolError::MissingPrefix(SYNC_FRAGMENT_PREFIX))?;
        let (rating, rest) = body
            .split_once('-')
            .ok_or_else(|| ProtocolError::malformed("sync fragment", body))?;
        let stars: u8 = rating
            .parse()
            .map_err(|_| ProtocolError::malformed("rating", rating))?;
        let (target, batch) = match rest.split_once('-') {
            Some((target, tail)) => (target, Some(BatchRef::parse_tail(tail)?)),
            None => (rest, None),
        };
        Ok(Self {
            rating: Rating::new(stars)?,
            target: target.parse()?,
            batch,
        })
    }
}

/// `#<score>-<target>-<batchId>-<index>-<sourceId>`, appended to a remote title URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffFragment {
    pub score: Score,
    pub target: SyncTarget,
    pub batch: BatchRef,
    pub source_id: String,
}

impl HandoffFragment {
    pub fn encode(&self) -> String {
        format!(
            "#{}-{}-{}-{}-{}",
            self.score, self.target, self.batch.batch_id, self.batch.index, self.source_id
        )
    }

    pub fn remote_url(&self, external_id: &str) -> String {
        format!("{REMOTE_TITLE_BASE}{external_id}/{}", self.encode())
    }

    pub fn decode(fragment: &str) -> Result<Self, ProtocolError> {
        let body = fragment.trim_start_matches('#');
        let (score, rest) = body
            .split_once('-')
            .ok_or_else(|| ProtocolError::malformed("handoff fragment", body))?;
        let (target, rest) = rest
            .split_once('-')
            .ok_or_else(|| ProtocolError::malformed("handoff fragment", body))?;
        let (batch_tail, source_id) = rest
            .rsplit_once('-')
            .ok_or_else(|| ProtocolError::malformed("handoff fragment", body))?;
        if source_id.is_empty() {
            return Err(ProtocolError::malformed("source id", source_id));
        }
        let points: u8 = score
            .parse()
            .map_err(|_| ProtocolError::malformed("score", score))?;
        Ok(Self {
            score: Score::new(points)?,
            target: target.parse()?,
            batch: BatchRef::parse_tail(batch_tail)?,
            source_id: source_id.to_string(),
        })
    }
}

/// Navigation from the remote title page back to the origin detail page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnTrip {
    pub outcome: OutcomeTag,
    pub batch: BatchRef,
    pub source_id: String,
    pub rating: Rating,
    pub target: SyncTarget,
}

impl ReturnTrip {
    pub fn from_handoff(handoff: &HandoffFragment, outcome: OutcomeTag) -> Self {
        Self {
            outcome,
            batch: handoff.batch.clone(),
            source_id: handoff.source_id.clone(),
            rating: handoff.score.to_rating(),
            target: handoff.target,
        }
    }

    pub fn url(&self) -> Result<String, ProtocolError> {
        let mut url = Url::parse(ORIGIN_SUBJECT_BASE)
            .and_then(|base| base.join(&format!("{}/", self.source_id)))
            .map_err(|err| ProtocolError::InvalidUrl(err.to_string()))?;
        url.query_pairs_mut()
            .append_pair(FROM_REMOTE_PARAM, "true")
            .append_pair("result", self.outcome.as_str())
            .append_pair("batchId", self.batch.batch_id.as_str())
            .append_pair("index", &self.batch.index.to_string());
        let fragment = SyncFragment {
            rating: self.rating,
            target: self.target,
            batch: Some(self.batch.clone()),
        }
        .encode();
        url.set_fragment(Some(fragment.trim_start_matches('#')));
        Ok(url.into())
    }

    /// Recognizes a detail page URL that carries an outcome from the remote site.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let url = Url::parse(raw).map_err(|err| ProtocolError::InvalidUrl(err.to_string()))?;
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
        };
        if param(FROM_REMOTE_PARAM).as_deref() != Some("true") {
            return Err(ProtocolError::NotReturnTrip);
        }
        let outcome = param("result").ok_or(ProtocolError::NotReturnTrip)?;
        let fragment = SyncFragment::decode(url.fragment().unwrap_or_default())?;

        // Query parameters win over the fragment when both are present.
        let batch = match (param("batchId"), param("index")) {
            (Some(batch_id), Some(index)) => BatchRef::new(
                batch_id.parse()?,
                index
                    .parse()
                    .map_err(|_| ProtocolError::malformed("item index", &index))?,
            ),
            _ => fragment
                .batch
                .clone()
                .ok_or_else(|| ProtocolError::malformed("return trip", raw))?,
        };
        let source_id =
            subject_id(&url).ok_or_else(|| ProtocolError::malformed("subject url", raw))?;

        Ok(Self {
            outcome: OutcomeTag::from(outcome.as_str()),
            batch,
            source_id,
            rating: fragment.rating,
            target: fragment.target,
        })
    }
}

/// The numeric id in `/subject/<id>/` of an origin detail URL.
pub fn subject_id(url: &Url) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "subject")?;
    segments
        .next()
        .filter(|id| !id.is_empty())
        .map(ToOwned::to_owned)
}

/// `#auto-sync-<target>`, marking a listing page opened by the continuation sequence.
pub fn auto_sync_fragment(target: SyncTarget) -> String {
    format!("#{AUTO_SYNC_PREFIX}{target}")
}

/// Returns the target of an auto-sync fragment; an unreadable target falls back to rating.
pub fn parse_auto_sync(fragment: &str) -> Option<SyncTarget> {
    let body = fragment.trim_start_matches('#');
    if body == AUTO_SYNC_PREFIX.trim_end_matches('-') {
        return Some(SyncTarget::Rating);
    }
    let target = body.strip_prefix(AUTO_SYNC_PREFIX)?;
    Some(target.parse().unwrap_or(SyncTarget::Rating))
}

/// URL of listing page `page` (1-based), tagged for auto-sync.
pub fn page_url(
    listing_url: &str,
    page: u32,
    per_page: u32,
    target: SyncTarget,
) -> Result<String, ProtocolError> {
    let mut url =
        Url::parse(listing_url).map_err(|err| ProtocolError::InvalidUrl(err.to_string()))?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "start")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let start = page.saturating_sub(1) * per_page;
    url.query_pairs_mut()
        .clear()
        .extend_pairs(kept)
        .append_pair("start", &start.to_string());
    url.set_fragment(Some(auto_sync_fragment(target).trim_start_matches('#')));
    Ok(url.into())
}
