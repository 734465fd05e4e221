//! Encoding and decoding of install deep links.
//!
//! Two grammars are understood:
//! - `<scheme>://plugin/install?type=mcp&id=..&schema=<json>&marketId=..&meta_<key>=..`
//! - `<scheme>://mcp/install?identifier=..&source=..&manifestUrl=..&autoConfig=true`
//!
//! Either one may also carry its whole parameter record as a JSON object in place of
//! the query string.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde_json::{Map, Value};
use url::{form_urlencoded, Url};

use crate::channel::Channel;
use crate::models::{
    InstallOptions, InstallPayload, InstallRequest, LegacyInstallParams, ParsedProtocolUrl,
    PluginKind, ProtocolAction, ProtocolSource, RouteCategory, SchemaPayload, SourcePlatform,
    UnknownTag,
};
use crate::schema::{self, SchemaError};

/// Wire prefix of meta parameters, stripped on decode.
pub const META_PREFIX: &str = "meta_";

type Params = Map<String, Value>;

/// Decode an untrusted install link. Every failure yields `None`; the reason is only
/// logged.
pub fn parse_protocol_url(raw: &str) -> Option<ParsedProtocolUrl> {
    match decode(raw) {
        Ok(parsed) => {
            tracing::debug!(
                channel = %parsed.channel,
                action = parsed.action.as_str(),
                plugin_id = parsed.plugin_id(),
                "decoded protocol url"
            );
            Some(parsed)
        }
        Err(reason) => {
            tracing::debug!(%reason, "rejected protocol url");
            None
        }
    }
}

fn decode(raw: &str) -> Result<ParsedProtocolUrl, DecodeError> {
    let url = Url::parse(raw.trim())?;

    let channel = Channel::from_scheme(url.scheme())
        .ok_or_else(|| DecodeError::UnknownScheme(url.scheme().to_string()))?;

    let (category, action) = route(&url)?;
    let query = query_params(&url)?;
    let params = &query.params;

    // A stray `type` next to `identifier` does not make a legacy link a schema link.
    let schema_link = params.contains_key("schema")
        || (params.contains_key("type") && !params.contains_key("identifier"));

    let (kind, payload) = if schema_link {
        if category != RouteCategory::Plugin {
            return Err(DecodeError::RouteMismatch(category.as_str()));
        }
        let (kind, payload) = schema_payload(&query)?;
        (kind, InstallPayload::Schema(payload))
    } else if params.contains_key("identifier") {
        let kind = PluginKind::from_str(category.as_str())
            .map_err(|_| DecodeError::RouteMismatch(category.as_str()))?;
        (kind, InstallPayload::Legacy(legacy_payload(&query)?))
    } else {
        return Err(DecodeError::MissingField("id"));
    };

    Ok(ParsedProtocolUrl {
        channel,
        category,
        kind,
        action,
        payload,
    })
}

/// Route segments are the host followed by the non-empty path segments, so that
/// `lobehub://plugin/install` and `lobehub:plugin/install` read the same.
fn route(url: &Url) -> Result<(RouteCategory, ProtocolAction), DecodeError> {
    let segments: Vec<&str> = url
        .host_str()
        .into_iter()
        .chain(url.path().split('/'))
        .filter(|segment| !segment.is_empty())
        .collect();

    let [category, action, ..] = segments.as_slice() else {
        return Err(DecodeError::UnknownRoute(segments.join("/")));
    };

    let category = RouteCategory::from_str(category).map_err(|e| DecodeError::UnknownRoute(e.0))?;
    let action = ProtocolAction::from_str(action).map_err(|e| DecodeError::UnknownRoute(e.0))?;
    Ok((category, action))
}

/// Parameter record of a link, and whether it arrived as a single JSON object.
struct Query {
    params: Params,
    json_form: bool,
}

fn query_params(url: &Url) -> Result<Query, DecodeError> {
    let Some(query) = url.query() else {
        return Ok(Query {
            params: Params::new(),
            json_form: false,
        });
    };

    let json_form = query.starts_with('{')
        || query
            .get(..3)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("%7b"));
    if json_form {
        let decoded = urlencoding::decode(query).map_err(|_| DecodeError::InvalidEncoding)?;
        return match serde_json::from_str::<Value>(&decoded) {
            Ok(Value::Object(params)) => Ok(Query {
                params,
                json_form: true,
            }),
            Ok(_) => Err(DecodeError::InvalidField("query")),
            Err(source) => Err(DecodeError::InvalidJson {
                field: "query",
                source,
            }),
        };
    }

    // First occurrence wins, as with URLSearchParams.get.
    let mut params = Params::new();
    for (key, value) in url.query_pairs() {
        params
            .entry(key.into_owned())
            .or_insert_with(|| Value::String(value.into_owned()));
    }
    Ok(Query {
        params,
        json_form: false,
    })
}

fn schema_payload(query: &Query) -> Result<(PluginKind, SchemaPayload), DecodeError> {
    let params = &query.params;
    let kind = required_param(params, "type")?
        .parse::<PluginKind>()
        .map_err(|e| DecodeError::UnsupportedType(e.0))?;
    let id = required_param(params, "id")?.to_string();

    let raw_schema = match params.get("schema") {
        Some(Value::String(text)) if !text.is_empty() => json_value(text, "schema")?,
        Some(obj @ Value::Object(_)) => obj.clone(),
        None | Some(Value::Null) | Some(Value::String(_)) => {
            return Err(DecodeError::MissingField("schema"))
        }
        Some(_) => return Err(DecodeError::InvalidField("schema")),
    };
    let schema = schema::validate(&raw_schema)?;

    if schema.identifier != id {
        tracing::warn!(
            id = %id,
            identifier = %schema.identifier,
            "install link id does not match schema identifier"
        );
    }

    let source = str_param(params, "source")?
        .map(|tag| tag.parse::<ProtocolSource>())
        .transpose()
        .map_err(|e| DecodeError::InvalidSource(e.0))?;

    let payload = SchemaPayload {
        id,
        schema,
        market_id: str_param(params, "marketId")?.map(String::from),
        meta_params: meta_params(query)?,
        source,
        options: install_options(params)?,
    };
    Ok((kind, payload))
}

fn legacy_payload(query: &Query) -> Result<LegacyInstallParams, DecodeError> {
    let params = &query.params;
    let identifier = required_param(params, "identifier")?.to_string();

    // Flat links may omit the source; a JSON record must name it. A corrupt tag is
    // never forgiven.
    let source = match str_param(params, "source")? {
        None if query.json_form => return Err(DecodeError::MissingField("source")),
        None => ProtocolSource::Official,
        Some(tag) => tag
            .parse::<ProtocolSource>()
            .map_err(|e: UnknownTag| DecodeError::InvalidSource(e.0))?,
    };

    Ok(LegacyInstallParams {
        identifier,
        source,
        options: install_options(params)?,
    })
}

fn install_options(params: &Params) -> Result<InstallOptions, DecodeError> {
    let auto_config = match params.get("autoConfig") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(flag)) => flag == "true",
        _ => false,
    };

    let preset_config = match params.get("presetConfig") {
        None | Some(Value::Null) => None,
        Some(Value::Object(preset)) => Some(preset.clone()),
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => match json_value(text, "presetConfig")? {
            Value::Object(preset) => Some(preset),
            _ => return Err(DecodeError::InvalidField("presetConfig")),
        },
        Some(_) => return Err(DecodeError::InvalidField("presetConfig")),
    };

    let source_platform = match params.get("sourcePlatform") {
        None | Some(Value::Null) => None,
        Some(Value::String(text)) if text.is_empty() => None,
        Some(Value::String(text)) => Some(parse_source_platform(json_value(text, "sourcePlatform")?)?),
        Some(value) => Some(parse_source_platform(value.clone())?),
    };

    Ok(InstallOptions {
        manifest_url: str_param(params, "manifestUrl")?.map(String::from),
        version: str_param(params, "version")?.map(String::from),
        auto_config,
        preset_config,
        source_platform,
    })
}

fn parse_source_platform(value: Value) -> Result<SourcePlatform, DecodeError> {
    let platform: SourcePlatform =
        serde_json::from_value(value).map_err(|source| DecodeError::InvalidJson {
            field: "sourcePlatform",
            source,
        })?;
    if platform.name.trim().is_empty() {
        return Err(DecodeError::InvalidField("sourcePlatform.name"));
    }
    Ok(platform)
}

fn meta_params(query: &Query) -> Result<BTreeMap<String, String>, DecodeError> {
    let params = &query.params;
    let mut meta = BTreeMap::new();

    // Only a JSON record can carry the nested object.
    if let Some(value) = params.get("metaParams").filter(|_| query.json_form) {
        let entries = value
            .as_object()
            .ok_or(DecodeError::InvalidField("metaParams"))?;
        for (key, value) in entries {
            let value = value
                .as_str()
                .ok_or(DecodeError::InvalidField("metaParams"))?;
            meta.insert(key.clone(), value.to_string());
        }
    }

    for (key, value) in params {
        if let Some(name) = key.strip_prefix(META_PREFIX) {
            let value = value.as_str().ok_or(DecodeError::InvalidField("meta"))?;
            meta.insert(name.to_string(), value.to_string());
        }
    }

    Ok(meta)
}

/// Parse JSON text. Older generators percent-encoded the blob before adding it to
/// the query, so one extra decoding pass is tried before giving up.
fn json_value(text: &str, field: &'static str) -> Result<Value, DecodeError> {
    serde_json::from_str(text)
        .or_else(|err| match urlencoding::decode(text) {
            Ok(decoded) if decoded != text => serde_json::from_str(&decoded),
            _ => Err(err),
        })
        .map_err(|source| DecodeError::InvalidJson { field, source })
}

/// Empty strings read as absent.
fn str_param<'a>(params: &'a Params, key: &'static str) -> Result<Option<&'a str>, DecodeError> {
    match params.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(DecodeError::InvalidField(key)),
    }
}

fn required_param<'a>(params: &'a Params, key: &'static str) -> Result<&'a str, DecodeError> {
    str_param(params, key)?.ok_or(DecodeError::MissingField(key))
}

#[derive(Debug, thiserror::Error)]
enum DecodeError {
    #[error("Malformed url: {0}")]
    MalformedUrl(#[from] url::ParseError),
    #[error("Unknown scheme: {0}")]
    UnknownScheme(String),
    #[error("Unknown route: {0}")]
    UnknownRoute(String),
    #[error("Parameters do not fit route category: {0}")]
    RouteMismatch(&'static str),
    #[error("Unsupported plugin type: {0}")]
    UnsupportedType(String),
    #[error("Missing required parameter: {0}")]
    MissingField(&'static str),
    #[error("Invalid parameter: {0}")]
    InvalidField(&'static str),
    #[error("Invalid source: {0}")]
    InvalidSource(String),
    #[error("Query is not valid percent-encoded UTF-8")]
    InvalidEncoding,
    #[error("Failed to parse {field} as JSON: {source}")]
    InvalidJson {
        field: &'static str,
        source: serde_json::Error,
    },
    #[error("Invalid schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Build a current-format install link using the channel's scheme.
pub fn generate_protocol_url(
    request: &InstallRequest,
    channel: Channel,
) -> Result<String, GenerateError> {
    if request.schema.identifier != request.id {
        return Err(GenerateError::IdentifierMismatch {
            id: request.id.clone(),
            identifier: request.schema.identifier.clone(),
        });
    }

    let schema_json = serde_json::to_value(&request.schema)?;
    schema::validate(&schema_json)?;

    let mut query = form_urlencoded::Serializer::new(String::new());
    query.append_pair("type", PluginKind::Mcp.as_str());
    query.append_pair("id", &request.id);
    query.append_pair("schema", &schema_json.to_string());
    append_non_empty(&mut query, "marketId", request.market_id.as_deref());
    for (key, value) in &request.meta_params {
        query.append_pair(&format!("{META_PREFIX}{key}"), value);
    }
    if let Some(source) = request.source {
        query.append_pair("source", source.as_str());
    }
    append_options(&mut query, &request.options)?;

    Ok(format!(
        "{}://{}/{}?{}",
        channel.scheme(),
        RouteCategory::Plugin.as_str(),
        ProtocolAction::Install.as_str(),
        query.finish()
    ))
}

/// Wire layout for identifier-only links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LegacyFormat {
    /// Whole query is the percent-encoded JSON of the parameters.
    #[default]
    Json,
    /// Flat `identifier=..&source=..` pairs.
    Query,
}

impl FromStr for LegacyFormat {
    type Err = UnknownTag;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(LegacyFormat::Json),
            "query" => Ok(LegacyFormat::Query),
            other => Err(UnknownTag(other.to_string())),
        }
    }
}

/// Build an identifier-only link, for hosts that have not moved to embedded schemas.
pub fn generate_legacy_url(
    params: &LegacyInstallParams,
    format: LegacyFormat,
    channel: Channel,
) -> Result<String, GenerateError> {
    if params.identifier.is_empty() {
        return Err(GenerateError::MissingIdentifier);
    }

    let base = format!(
        "{}://{}/{}",
        channel.scheme(),
        RouteCategory::Mcp.as_str(),
        ProtocolAction::Install.as_str()
    );

    let query = match format {
        LegacyFormat::Json => urlencoding::encode(&serde_json::to_string(params)?).into_owned(),
        LegacyFormat::Query => {
            let mut query = form_urlencoded::Serializer::new(String::new());
            query.append_pair("identifier", &params.identifier);
            query.append_pair("source", params.source.as_str());
            append_options(&mut query, &params.options)?;
            query.finish()
        }
    };

    Ok(format!("{base}?{query}"))
}

fn append_options(
    query: &mut form_urlencoded::Serializer<'_, String>,
    options: &InstallOptions,
) -> Result<(), serde_json::Error> {
    append_non_empty(query, "manifestUrl", options.manifest_url.as_deref());
    append_non_empty(query, "version", options.version.as_deref());
    if options.auto_config {
        query.append_pair("autoConfig", "true");
    }
    if let Some(preset) = &options.preset_config {
        query.append_pair("presetConfig", &Value::Object(preset.clone()).to_string());
    }
    if let Some(platform) = &options.source_platform {
        query.append_pair("sourcePlatform", &serde_json::to_string(platform)?);
    }
    Ok(())
}

fn append_non_empty(
    query: &mut form_urlencoded::Serializer<'_, String>,
    key: &str,
    value: Option<&str>,
) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        query.append_pair(key, value);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Schema identifier must match the id parameter (id: {id}, identifier: {identifier})")]
    IdentifierMismatch { id: String, identifier: String },
    #[error("Identifier must not be empty")]
    MissingIdentifier,
    #[error("Invalid schema: {0}")]
    InvalidSchema(#[from] SchemaError),
    #[error("Failed to serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}
