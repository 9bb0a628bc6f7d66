//! Process-wide tracing setup for the pubstead binaries.
//!
//! Behaviour is driven entirely by environment variables so the server can be
//! reconfigured without touching its config file:
//!
//! | Variable        | Values                      | Default                   |
//! |-----------------|-----------------------------|---------------------------|
//! | `RUST_LOG`      | any `EnvFilter` directive   | falls back to `LOG_LEVEL` |
//! | `LOG_LEVEL`     | `trace` .. `error`          | `info`                    |
//! | `LOG_OUTPUT`    | `console`, `file`, `both`   | `console`                 |
//! | `LOG_FORMAT`    | `human`, `json`             | `human`                   |
//! | `LOG_FILE_PATH` | path of the rolling log     | `<tmp>/pubstead.log`      |
//! | `LOG_SPANS`     | `key:value,...` span filter | empty (no filtering)      |

use std::{
    collections::HashMap,
    env,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{field::Visit, span, Metadata, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::MakeWriter,
    layer::{Context, Layer},
    prelude::*,
    registry,
    registry::LookupSpan,
    EnvFilter,
};

// Writes every record to both sinks.
struct Tee<A, B> {
    a: A,
    b: B,
}

impl<A, B> Write for Tee<A, B>
where
    A: Write,
    B: Write,
{
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let res_a = self.a.write(buf);
        let res_b = self.b.write(buf);
        res_a.or(res_b)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.a.flush()?;
        self.b.flush()
    }
}

#[derive(Clone)]
struct MakeTee<A, B> {
    make_a: A,
    make_b: B,
}

impl<'a, A, B, W1, W2> MakeWriter<'a> for MakeTee<A, B>
where
    A: MakeWriter<'a, Writer = W1>,
    B: MakeWriter<'a, Writer = W2>,
    W1: Write + 'a,
    W2: Write + 'a,
{
    type Writer = Tee<W1, W2>;
    fn make_writer(&'a self) -> Self::Writer {
        Tee {
            a: self.make_a.make_writer(),
            b: self.make_b.make_writer(),
        }
    }
}

/// A `key:value` pair that events must carry in one of their enclosing spans.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpanTag {
    pub key: String,
    pub value: String,
}

/// Parse a `LOG_SPANS` value such as `package:http,method:*`.
///
/// Malformed entries (no colon) are skipped.
pub fn parse_span_tags(raw: &str) -> Vec<SpanTag> {
    raw.split(',')
        .filter_map(|s| {
            let mut parts = s.splitn(2, ':');
            let key = parts.next()?.trim().to_string();
            let value = parts.next()?.trim().to_string();
            if key.is_empty() {
                return None;
            }
            Some(SpanTag { key, value })
        })
        .collect()
}

struct SpanTagFilter {
    tags: Vec<SpanTag>,
}

impl<S> Layer<S> for SpanTagFilter
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = HashMap::new();
        attrs.record(&mut FieldVisitor(&mut fields));
        span.extensions_mut().insert(fields);
    }

    fn enabled(&self, _meta: &Metadata<'_>, ctx: Context<'_, S>) -> bool {
        if self.tags.is_empty() {
            return true;
        }

        // Events outside any span are dropped once tags are configured.
        let Some(scope) = ctx.current_span().id().and_then(|id| ctx.span_scope(id)) else {
            return false;
        };

        let mut all_fields = HashMap::new();
        for span_ref in scope {
            if let Some(fields) = span_ref.extensions().get::<HashMap<String, String>>() {
                for (k, v) in fields {
                    all_fields.entry(k.clone()).or_insert_with(|| v.clone());
                }
            }
        }

        self.tags.iter().all(|tag| {
            all_fields
                .get(&tag.key)
                .is_some_and(|value| tag.value == "*" || value.contains(&tag.value))
        })
    }
}

struct FieldVisitor<'a>(&'a mut HashMap<String, String>);

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        self.0.insert(field.name().to_string(), value.to_string());
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        self.0
            .insert(field.name().to_string(), format!("{value:?}"));
    }
}

fn default_log_path() -> PathBuf {
    env::temp_dir().join("pubstead.log")
}

/// Initializes the global tracing subscriber based on environment variables.
///
/// The returned guard must be kept alive for the lifetime of the process when
/// file output is enabled, otherwise buffered lines are lost on exit.
pub fn init_subscriber() -> Option<WorkerGuard> {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let log_output = env::var("LOG_OUTPUT").unwrap_or_else(|_| "console".to_string());
    let log_format = env::var("LOG_FORMAT").unwrap_or_else(|_| "human".to_string());
    let log_spans = env::var("LOG_SPANS").unwrap_or_default();
    let log_file_path = env::var("LOG_FILE_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| default_log_path());

    let mut env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    for directive in ["tokio=warn", "hyper=warn", "h2=warn"] {
        if let Ok(directive) = directive.parse() {
            env_filter = env_filter.add_directive(directive);
        }
    }

    let span_filter = SpanTagFilter {
        tags: parse_span_tags(&log_spans),
    };

    let use_console = log_output == "console" || log_output == "both";
    let use_file = log_output == "file" || log_output == "both";
    let is_json = log_format == "json";

    let mut guard: Option<WorkerGuard> = None;

    let subscriber = registry().with(env_filter).with(span_filter);

    let log_dir = log_file_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(env::temp_dir);
    let log_filename = log_file_path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_else(|| "pubstead.log".into());

    // `try_init` so tests that initialise twice don't panic.
    if use_console && use_file {
        let file_appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let tee_writer = MakeTee {
            make_a: std::io::stdout,
            make_b: non_blocking,
        };

        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(tee_writer);
        if is_json {
            let _ = subscriber.with(fmt_layer.json()).try_init();
        } else {
            let _ = subscriber.with(fmt_layer).try_init();
        }
    } else if use_console {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stdout);
        if is_json {
            let _ = subscriber.with(fmt_layer.json()).try_init();
        } else {
            let _ = subscriber.with(fmt_layer).try_init();
        }
    } else if use_file {
        let file_appender = tracing_appender::rolling::daily(&log_dir, &log_filename);
        let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);
        guard = Some(file_guard);

        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(non_blocking);
        if is_json {
            let _ = subscriber.with(fmt_layer.json()).try_init();
        } else {
            let _ = subscriber.with(fmt_layer).try_init();
        }
    } else {
        let _ = subscriber.try_init();
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_span_tags() {
        let tags = parse_span_tags("package:http, method:*");
        assert_eq!(
            tags,
            vec![
                SpanTag {
                    key: "package".to_string(),
                    value: "http".to_string()
                },
                SpanTag {
                    key: "method".to_string(),
                    value: "*".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_parse_span_tags_skips_malformed_entries() {
        assert!(parse_span_tags("").is_empty());
        assert!(parse_span_tags("no-colon").is_empty());
        assert_eq!(parse_span_tags(":value,key:v").len(), 1);
    }

    #[test]
    fn test_tee_writes_to_both_sinks() {
        let mut tee = Tee {
            a: Vec::new(),
            b: Vec::new(),
        };
        tee.write_all(b"line\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(tee.a, b"line\n");
        assert_eq!(tee.b, b"line\n");
    }
}
