use crate::config::CuratorSettings;
use crate::media;
use crate::tags::TagRecord;
use crate::{EngineError, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Read};
use std::sync::OnceLock;
use std::time::Duration;
use url::Url;

const MAX_RESPONSE_BYTES: u64 = 4 * 1024 * 1024;
const USER_AGENT: &str = "curator-engine";

/// A text-generation service. Any failure to reach it must be reported as
/// `InferenceUnavailable` so callers can switch the feature off instead of
/// treating it as an item failure.
pub trait Inference {
    fn list_models(&self) -> Result<Vec<String>>;

    fn generate(&self, prompt: &str) -> Result<String>;

    /// Like `generate`, but hands each token to `on_token` as it arrives.
    fn generate_streamed(&self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> Result<String>;

    fn is_available(&self) -> bool {
        self.list_models().is_ok()
    }
}

impl<T: Inference + ?Sized> Inference for &T {
    fn list_models(&self) -> Result<Vec<String>> {
        (**self).list_models()
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt)
    }

    fn generate_streamed(&self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> Result<String> {
        (**self).generate_streamed(prompt, on_token)
    }

    fn is_available(&self) -> bool {
        (**self).is_available()
    }
}

pub struct OllamaClient {
    base_url: Url,
    model: String,
    agent: ureq::Agent,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GenerateChunk {
    response: String,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    name: String,
}

impl OllamaClient {
    /// An empty `model` means "use the first model the endpoint lists".
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> Result<Self> {
        let trimmed = base_url.trim().trim_end_matches('/');
        let base_url = Url::parse(&format!("{trimmed}/")).map_err(|e| {
            EngineError::InvalidInput(format!("invalid inference url {trimmed:?}: {e}"))
        })?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(EngineError::InvalidInput(format!(
                "inference url must be http or https: {trimmed}"
            )));
        }

        let mut config = ureq::Agent::config_builder();
        config = config
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(timeout_secs.max(1))))
            .user_agent(USER_AGENT);

        Ok(Self {
            base_url,
            model: model.trim().to_string(),
            agent: config.build().into(),
        })
    }

    pub fn from_settings(settings: &CuratorSettings) -> Result<Self> {
        Self::new(
            &settings.inference_base_url,
            &settings.inference_model,
            settings.inference_timeout_secs,
        )
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        self.base_url
            .join(path)
            .map(String::from)
            .map_err(|e| EngineError::InvalidInput(format!("invalid inference endpoint: {e}")))
    }

    fn resolve_model(&self) -> Result<String> {
        if !self.model.is_empty() {
            return Ok(self.model.clone());
        }
        self.list_models()?
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::InferenceUnavailable("no models installed".to_string()))
    }

    fn post_generate(&self, prompt: &str, stream: bool) -> Result<ureq::http::Response<ureq::Body>> {
        let model = self.resolve_model()?;
        let body = serde_json::to_string(&GenerateRequest {
            model: &model,
            prompt,
            stream,
        })?;
        let response = self
            .agent
            .post(&self.endpoint("api/generate")?)
            .header("Content-Type", "application/json")
            .send(body)
            .map_err(unavailable)?;
        check_status(response)
    }
}

impl Inference for OllamaClient {
    fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .agent
            .get(&self.endpoint("api/tags")?)
            .call()
            .map_err(unavailable)?;
        let mut response = check_status(response)?;
        let body = read_body(&mut response)?;
        let parsed: TagsResponse = serde_json::from_str(&body)?;
        Ok(parsed.models.into_iter().map(|m| m.name).collect())
    }

    fn generate(&self, prompt: &str) -> Result<String> {
        let mut response = self.post_generate(prompt, false)?;
        let body = read_body(&mut response)?;
        let chunk: GenerateChunk = serde_json::from_str(&body)?;
        if let Some(err) = chunk.error {
            return Err(EngineError::Inference(err));
        }
        Ok(chunk.response)
    }

    fn generate_streamed(&self, prompt: &str, on_token: &mut dyn FnMut(&str)) -> Result<String> {
        let response = self.post_generate(prompt, true)?;
        let reader = BufReader::new(response.into_body().into_reader());
        read_ndjson_stream(reader, on_token)
    }
}

fn unavailable(err: ureq::Error) -> EngineError {
    EngineError::InferenceUnavailable(err.to_string())
}

fn check_status(
    mut response: ureq::http::Response<ureq::Body>,
) -> Result<ureq::http::Response<ureq::Body>> {
    let status = response.status().as_u16();
    if status >= 400 {
        let body = read_body(&mut response).unwrap_or_default();
        let detail = serde_json::from_str::<GenerateChunk>(&body)
            .ok()
            .and_then(|c| c.error)
            .unwrap_or(body);
        return Err(EngineError::Inference(format!("http {status}: {}", detail.trim())));
    }
    Ok(response)
}

fn read_body(response: &mut ureq::http::Response<ureq::Body>) -> Result<String> {
    let mut body = String::new();
    response
        .body_mut()
        .as_reader()
        .take(MAX_RESPONSE_BYTES)
        .read_to_string(&mut body)?;
    Ok(body)
}

/// Concatenates the `response` field of each JSON line. Lines that are not
/// JSON are skipped; an `error` line ends the stream with an error.
pub fn read_ndjson_stream<R: BufRead>(reader: R, on_token: &mut dyn FnMut(&str)) -> Result<String> {
    let mut full = String::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(chunk) = serde_json::from_str::<GenerateChunk>(line) else {
            continue;
        };
        if let Some(err) = chunk.error {
            return Err(EngineError::Inference(err));
        }
        if !chunk.response.is_empty() {
            on_token(&chunk.response);
            full.push_str(&chunk.response);
        }
    }
    Ok(full)
}

pub fn rename_prompt(old_filename: &str) -> String {
    format!(
        "Rename this file to be unique and creative: \"{old_filename}\". The file appears to be a \
duplicate. Respond with ONLY the new filename (including extension), nothing else. Make it poetic \
or interesting. For example, if the file is \"Rose(1).mp3\", you might respond with \"By Any Other \
Name.mp3\" or \"Crimson Petals.mp3\". Just give me the new filename:"
    )
}

/// First non-empty line of the reply, unquoted, with `original`'s extension forced on.
pub fn clean_suggested_name(raw: &str, original: &str) -> Option<String> {
    static EXT_RE: OnceLock<Regex> = OnceLock::new();
    let ext_re = EXT_RE.get_or_init(|| Regex::new(r"\.[^.]+$").expect("extension regex"));

    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let unquoted: String = line.chars().filter(|c| *c != '"' && *c != '\'').collect();
    let name = media::basename(unquoted.trim()).trim().to_string();

    let ext = media::extension(original);
    let name = if name.to_lowercase().ends_with(&ext.to_lowercase()) {
        name
    } else {
        format!("{}{ext}", ext_re.replace(&name, ""))
    };

    let stem = name.get(..name.len().saturating_sub(ext.len())).unwrap_or(&name);
    if stem.trim().is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

pub fn metadata_prompt(filename: &str, current: &TagRecord) -> String {
    let or_none = |v: &str| {
        if v.trim().is_empty() {
            "none".to_string()
        } else {
            v.to_string()
        }
    };
    format!(
        "You are helping organize MP3 files. Generate better metadata.
Current info:
- Filename: {filename}
- Title: {}
- Artist: {}
- Album: {}
- Genre: {}

Provide improved metadata. If the filename has useful info, extract it.
For the Comment field, write a poetic, unique, thought-provoking 1-2 sentence description about \
the song's mood, theme, or emotional journey based on the Title, Artist, and Album.

Format your response EXACTLY like this:
Title: <clean title>
Artist: <artist name>
Album: <album name>
Genre: <genre>
Comment: <poetic 1-2 sentence description>",
        or_none(&current.title),
        or_none(&current.artist),
        or_none(&current.album),
        or_none(&current.genre),
    )
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataSuggestion {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub genre: Option<String>,
    pub comment: Option<String>,
}

impl MetadataSuggestion {
    pub fn is_empty(&self) -> bool {
        *self == MetadataSuggestion::default()
    }
}

pub fn parse_metadata_suggestion(text: &str) -> MetadataSuggestion {
    static LINE_RE: OnceLock<Regex> = OnceLock::new();
    let re = LINE_RE.get_or_init(|| {
        Regex::new(r"(?m)(Title|Artist|Album|Genre|Comment):[ \t]*(.+)$").expect("suggestion regex")
    });

    let mut out = MetadataSuggestion::default();
    for caps in re.captures_iter(text) {
        let value = caps[2].trim();
        if value.is_empty() {
            continue;
        }
        let slot = match &caps[1] {
            "Title" => &mut out.title,
            "Artist" => &mut out.artist,
            "Album" => &mut out.album,
            "Genre" => &mut out.genre,
            _ => &mut out.comment,
        };
        // First occurrence wins.
        if slot.is_none() {
            *slot = Some(value.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn suggested_name_keeps_original_extension() {
        assert_eq!(
            clean_suggested_name("\"Crimson Petals.mp3\"", "Rose(1).mp3").as_deref(),
            Some("Crimson Petals.mp3")
        );
        assert_eq!(
            clean_suggested_name("Crimson Petals.MP3", "Rose(1).mp3").as_deref(),
            Some("Crimson Petals.MP3")
        );
        assert_eq!(
            clean_suggested_name("Crimson Petals.wav", "Rose(1).mp3").as_deref(),
            Some("Crimson Petals.mp3")
        );
        assert_eq!(
            clean_suggested_name("By Any Other Name", "Rose(1).flac").as_deref(),
            Some("By Any Other Name.flac")
        );
    }

    #[test]
    fn suggested_name_uses_first_line_and_rejects_empty() {
        assert_eq!(
            clean_suggested_name("\n  'Night Bloom.mp3'\nHope you like it!", "x(2).mp3").as_deref(),
            Some("Night Bloom.mp3")
        );
        assert_eq!(clean_suggested_name("   ", "x(2).mp3"), None);
        assert_eq!(clean_suggested_name("\".mp3\"", "x(2).mp3"), None);
        assert_eq!(
            clean_suggested_name("../../etc/Escape.mp3", "x(2).mp3").as_deref(),
            Some("Escape.mp3")
        );
    }

    #[test]
    fn metadata_prompt_marks_empty_fields_none() {
        let current = TagRecord {
            title: "Drive".to_string(),
            ..TagRecord::default()
        };
        let prompt = metadata_prompt("03 drive.mp3", &current);
        assert!(prompt.contains("- Filename: 03 drive.mp3"));
        assert!(prompt.contains("- Title: Drive"));
        assert!(prompt.contains("- Artist: none"));
        assert!(prompt.contains("- Genre: none"));
    }

    #[test]
    fn suggestion_lines_are_parsed() {
        let text = "Sure! Here you go:\nTitle: Midnight Drive\nArtist:  Night Shift \nAlbum:\nGenre: Synthwave\nComment: Neon rain on empty streets.\nTitle: ignored";
        let s = parse_metadata_suggestion(text);
        assert_eq!(s.title.as_deref(), Some("Midnight Drive"));
        assert_eq!(s.artist.as_deref(), Some("Night Shift"));
        assert_eq!(s.album, None);
        assert_eq!(s.genre.as_deref(), Some("Synthwave"));
        assert_eq!(s.comment.as_deref(), Some("Neon rain on empty streets."));
        assert!(parse_metadata_suggestion("no structure here").is_empty());
    }

    #[test]
    fn ndjson_stream_concatenates_responses() {
        let body = "{\"response\":\"Title: \",\"done\":false}\n\n{\"response\":\"Rain\",\"done\":false}\nnot json\n{\"response\":\"\",\"done\":true}\n";
        let mut tokens = Vec::new();
        let text = read_ndjson_stream(Cursor::new(body), &mut |t| tokens.push(t.to_string()))
            .expect("stream");
        assert_eq!(text, "Title: Rain");
        assert_eq!(tokens, vec!["Title: ", "Rain"]);
    }

    #[test]
    fn ndjson_error_line_fails_stream() {
        let body = "{\"response\":\"a\"}\n{\"error\":\"model not found\"}\n";
        let err = read_ndjson_stream(Cursor::new(body), &mut |_| {}).expect_err("should fail");
        assert!(matches!(err, EngineError::Inference(ref m) if m == "model not found"));
    }

    #[test]
    fn client_rejects_non_http_urls() {
        assert!(OllamaClient::new("ftp://localhost:11434", "", 5).is_err());
        assert!(OllamaClient::new("not a url", "", 5).is_err());
        let client = OllamaClient::new("http://localhost:11434/", "m", 5).expect("client");
        assert_eq!(
            client.endpoint("api/tags").expect("endpoint"),
            "http://localhost:11434/api/tags"
        );
    }

    #[test]
    fn unreachable_endpoint_reports_unavailable() {
        // Port 9 (discard) on loopback is closed on test machines.
        let client = OllamaClient::new("http://127.0.0.1:9", "", 2).expect("client");
        let err = client.list_models().expect_err("should fail");
        assert!(matches!(err, EngineError::InferenceUnavailable(_)));
        assert!(!client.is_available());
    }
}
