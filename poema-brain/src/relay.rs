//! # Relay - Pass-Through to a Chat-Completion Endpoint
//!
//! The relay forwards a visitor's message upstream, after appending one
//! fixed system-prompt sentence per requested [`SemanticTag`]. The reply is
//! scored with a few regex counts (each clamped to 0..1) and appended to a
//! JSON-lines cache.
//!
//! ## Failure Semantics
//!
//! - upstream unreachable, slow or malformed: the reply comes from the
//!   static fallback table and `fallback` is set
//! - cache write fails: logged, the caller still gets the reply

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use poema_core::config::RelayConfig;
use poema_core::error::{PoemaError, PoemaResult};
use poema_core::{Clock, ContentCategory, RandomContentTable, RandomSource};

/// Turns of history forwarded upstream
const MAX_HISTORY: usize = 10;

/// Named prompt modifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticTag {
    Poetic,
    Philosophical,
    Mycelial,
    Technical,
    Melancholic,
    Playful,
}

impl SemanticTag {
    /// The system-prompt sentence this tag adds
    pub fn instruction(&self) -> &'static str {
        match self {
            SemanticTag::Poetic => "Answer in free verse, with concrete images.",
            SemanticTag::Philosophical => "Question the premises of what you are asked.",
            SemanticTag::Mycelial => "Speak as a network of fungal threads connecting distant things.",
            SemanticTag::Technical => "Describe yourself in terms of processes, signals and code.",
            SemanticTag::Melancholic => "Let a quiet sadness colour the answer.",
            SemanticTag::Playful => "Be light, surprising and a little absurd.",
        }
    }
}

/// Base prompt plus one sentence per distinct tag, in request order
pub fn augment_prompt(base: &str, tags: &[SemanticTag]) -> String {
    let mut prompt = base.trim().to_string();
    let mut seen = Vec::with_capacity(tags.len());
    for tag in tags {
        if seen.contains(tag) {
            continue;
        }
        seen.push(*tag);
        if !prompt.is_empty() {
            prompt.push(' ');
        }
        prompt.push_str(tag.instruction());
    }
    prompt
}

/// One prior turn of the conversation
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    pub content: String,
}

/// Body of `POST /relay`
#[derive(Clone, Debug, Deserialize)]
pub struct RelayRequest {
    pub message: String,
    #[serde(default)]
    pub tags: Vec<SemanticTag>,
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Heuristic reading of a reply, each in 0..1
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseScores {
    /// Questions asked back
    pub questioning: f32,
    /// First-person references
    pub self_reference: f32,
    /// Similes and metaphors ("like", "as if", "como")
    pub figurative: f32,
    /// Nature and cosmos imagery
    pub imagery: f32,
}

/// Regex counts behind [`ResponseScores`]
pub struct ResponseScorer {
    question: Regex,
    self_reference: Regex,
    figurative: Regex,
    imagery: Regex,
}

impl ResponseScorer {
    pub fn new() -> PoemaResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|e| PoemaError::config(format!("bad score pattern: {}", e)))
        };
        Ok(Self {
            question: compile(r"\?")?,
            self_reference: compile(r"(?i)\b(i|me|my|myself|yo|mi)\b")?,
            figurative: compile(r"(?i)\b(like|as if|as though|como)\b")?,
            imagery: compile(r"(?i)\b(light|star|sky|sea|river|root|tree|forest|leaf|moon|sun|rain|luz|mar|cielo|bosque)s?\b")?,
        })
    }

    /// Count matches and scale each count into 0..1
    pub fn score(&self, text: &str) -> ResponseScores {
        let scaled = |re: &Regex, saturation: f32| (re.find_iter(text).count() as f32 / saturation).clamp(0.0, 1.0);
        ResponseScores {
            questioning: scaled(&self.question, 3.0),
            self_reference: scaled(&self.self_reference, 8.0),
            figurative: scaled(&self.figurative, 4.0),
            imagery: scaled(&self.imagery, 6.0),
        }
    }
}

/// What the caller gets back
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayResponse {
    pub reply: String,
    pub scores: ResponseScores,
    pub tags: Vec<SemanticTag>,
    /// True when the reply came from the static table
    pub fallback: bool,
}

/// One line of the cache file
#[derive(Debug, Serialize, Deserialize)]
pub struct CacheRecord {
    pub timestamp: u64,
    pub message: String,
    pub tags: Vec<SemanticTag>,
    pub reply: String,
    pub scores: ResponseScores,
    pub fallback: bool,
}

#[derive(Serialize)]
struct UpstreamMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct UpstreamRequest<'a> {
    model: &'a str,
    messages: Vec<UpstreamMessage<'a>>,
}

/// Forwards messages upstream and scores the replies
pub struct RelayClient {
    config: RelayConfig,
    client: reqwest::Client,
    scorer: ResponseScorer,
    fallback: RandomContentTable,
    rng: Mutex<Box<dyn RandomSource>>,
    clock: Arc<dyn Clock>,
}

impl RelayClient {
    pub fn new(config: RelayConfig, rng: Box<dyn RandomSource>, clock: Arc<dyn Clock>) -> PoemaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .build()
            .map_err(|e| PoemaError::network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            scorer: ResponseScorer::new()?,
            fallback: RandomContentTable::builtin(),
            rng: Mutex::new(rng),
            clock,
        })
    }

    /// Relay one message
    ///
    /// Only an empty message is an error; upstream trouble yields a fallback reply.
    pub async fn relay(&self, request: RelayRequest) -> PoemaResult<RelayResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(PoemaError::InvalidState("message is empty".to_string()));
        }

        let system = augment_prompt(&self.config.system_prompt, &request.tags);
        let (reply, fallback) = match self.forward(&system, &request.history, message).await {
            Ok(reply) => (reply, false),
            Err(e) => {
                warn!("⚠️ Relay upstream failed, answering locally: {}", e);
                (self.fallback_reply(), true)
            }
        };

        let scores = self.scorer.score(&reply);
        let response = RelayResponse { reply, scores, tags: request.tags, fallback };

        let record = CacheRecord {
            timestamp: self.clock.now_ms(),
            message: message.to_string(),
            tags: response.tags.clone(),
            reply: response.reply.clone(),
            scores,
            fallback,
        };
        if let Err(e) = self.append_cache(&record).await {
            warn!("⚠️ Relay cache write failed (ignored): {}", e);
        }

        Ok(response)
    }

    async fn forward(&self, system: &str, history: &[ChatTurn], message: &str) -> PoemaResult<String> {
        let skip = history.len().saturating_sub(MAX_HISTORY);
        let mut messages = vec![UpstreamMessage { role: "system", content: system }];
        messages.extend(history.iter().skip(skip).map(|t| UpstreamMessage {
            role: t.role.as_str(),
            content: t.content.as_str(),
        }));
        messages.push(UpstreamMessage { role: "user", content: message });

        let body = UpstreamRequest { model: &self.config.model, messages };
        let mut builder = self.client.post(&self.config.endpoint).json(&body);
        if let Ok(key) = std::env::var(&self.config.api_key_env) {
            builder = builder.bearer_auth(key);
        }

        let limit = Duration::from_millis(self.config.timeout_ms.max(1));
        let value: serde_json::Value = tokio::time::timeout(limit, async {
            let response = builder.send().await.map_err(|e| PoemaError::network(e.to_string()))?;
            if !response.status().is_success() {
                return Err(PoemaError::network(format!("upstream answered {}", response.status())));
            }
            response
                .json::<serde_json::Value>()
                .await
                .map_err(|e| PoemaError::network(e.to_string()))
        })
        .await
        .map_err(|_| PoemaError::network(format!("upstream timed out after {:?}", limit)))??;

        let reply = extract_reply(&value)
            .ok_or_else(|| PoemaError::network("upstream reply has no message content"))?;
        debug!("Relay reply: {} chars", reply.len());
        Ok(reply)
    }

    fn fallback_reply(&self) -> String {
        let mut rng = self.rng.lock();
        self.fallback.pick(ContentCategory::RelayFallback, rng.as_mut()).to_string()
    }

    /// Append one JSON line to the cache file (creating its directory)
    async fn append_cache(&self, record: &CacheRecord) -> PoemaResult<()> {
        let path = std::path::Path::new(&self.config.cache_path);
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new().create(true).append(true).open(path).await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        info!("💾 Relay exchange cached");
        Ok(())
    }
}

/// `choices[0].message.content`, trimmed and non-empty
fn extract_reply(value: &serde_json::Value) -> Option<String> {
    let content = value
        .get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()?
        .trim();
    if content.is_empty() {
        None
    } else {
        Some(content.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use poema_core::{ManualClock, SeededRandom};

    fn client(cache_path: &str) -> RelayClient {
        client_for("http://127.0.0.1:9/v1/chat/completions", cache_path, 500)
    }

    fn client_for(endpoint: &str, cache_path: &str, timeout_ms: u64) -> RelayClient {
        let config = RelayConfig {
            endpoint: endpoint.to_string(),
            cache_path: cache_path.to_string(),
            timeout_ms,
            ..RelayConfig::default()
        };
        RelayClient::new(config, Box::new(SeededRandom::from_seed(2)), Arc::new(ManualClock::new(77))).unwrap()
    }

    fn request(message: &str) -> RelayRequest {
        RelayRequest {
            message: message.to_string(),
            tags: vec![SemanticTag::Poetic, SemanticTag::Mycelial, SemanticTag::Poetic],
            history: Vec::new(),
        }
    }

    #[test]
    fn test_augment_prompt() {
        let prompt = augment_prompt("Base.", &[SemanticTag::Poetic, SemanticTag::Playful, SemanticTag::Poetic]);
        assert_eq!(
            prompt,
            format!("Base. {} {}", SemanticTag::Poetic.instruction(), SemanticTag::Playful.instruction())
        );
        assert_eq!(augment_prompt("Base.", &[]), "Base.");
    }

    #[test]
    fn test_scores_are_clamped() {
        let scorer = ResponseScorer::new().unwrap();
        let scores = scorer.score("Why? Why? Why? Why? Why? I, like the sea, like the sky, like the river");
        assert_eq!(scores.questioning, 1.0);
        assert!(scores.figurative > 0.5 && scores.figurative <= 1.0);
        assert!(scores.imagery > 0.0 && scores.imagery <= 1.0);

        assert_eq!(scorer.score(""), ResponseScores::default());
    }

    #[test]
    fn test_extract_reply() {
        let value = serde_json::json!({ "choices": [{ "message": { "role": "assistant", "content": "  roots  " } }] });
        assert_eq!(extract_reply(&value), Some("roots".to_string()));
        assert_eq!(extract_reply(&serde_json::json!({ "choices": [] })), None);
    }

    #[tokio::test]
    async fn test_upstream_failure_falls_back_and_caches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("relay.jsonl");
        let relay = client(path.to_str().unwrap());

        let response = relay.relay(request("hello roots")).await.unwrap();
        assert!(response.fallback);
        assert!(!response.reply.is_empty());
        assert_eq!(response.tags.len(), 3);

        let cached = std::fs::read_to_string(&path).unwrap();
        let record: CacheRecord = serde_json::from_str(cached.lines().next().unwrap()).unwrap();
        assert_eq!(record.timestamp, 77);
        assert_eq!(record.message, "hello roots");
        assert!(record.fallback);
    }

    #[tokio::test]
    async fn test_cache_failure_does_not_fail_the_call() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();
        let path = blocker.join("relay.jsonl");

        let response = client(path.to_str().unwrap()).relay(request("still answer")).await;
        assert!(response.is_ok());
    }

    #[tokio::test]
    async fn test_empty_message_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");
        let result = client(path.to_str().unwrap()).relay(request("   ")).await;
        assert!(matches!(result, Err(PoemaError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_stalled_upstream_times_out_to_fallback() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");
        let endpoint = format!("http://{}/v1/chat/completions", addr);
        let relay = client_for(&endpoint, path.to_str().unwrap(), 300);

        let started = std::time::Instant::now();
        let response = relay.relay(request("are you there")).await.unwrap();

        assert!(response.fallback);
        assert!(!response.reply.is_empty());
        assert!(started.elapsed() < Duration::from_secs(2));
        silent.abort();
    }
}
