// Main CLI entry point for doppel-surface
// Uses clap for argument parsing

use clap::{Arg, ArgAction, Command};
use doppel_surface::component::{display_value, Component, ComponentKind, RequestComponent};
use doppel_surface::config::SurfaceConfig;
use doppel_surface::engine::AttackEngine;
use doppel_surface::models::HttpRequest;
use std::fs;
use tracing::{debug, warn};

/// One mutation requested on the command line
#[derive(Debug, Clone, PartialEq)]
enum Mutation {
    Set {
        kind: ComponentKind,
        key: String,
        value: String,
    },
    Delete {
        kind: ComponentKind,
        key: String,
    },
}

impl Mutation {
    fn kind(&self) -> ComponentKind {
        match self {
            Mutation::Set { kind, .. } | Mutation::Delete { kind, .. } => *kind,
        }
    }
}

/// Parse `kind:key=value` (set) or `kind:key` (delete)
fn parse_mutation(arg: &str, delete: bool) -> Result<Mutation, String> {
    let (kind, rest) = arg
        .split_once(':')
        .ok_or_else(|| format!("expected kind:key in {:?}", arg))?;
    let kind: ComponentKind = kind.parse().map_err(|e| format!("{}", e))?;

    if delete {
        if rest.is_empty() {
            return Err(format!("missing key in {:?}", arg));
        }
        return Ok(Mutation::Delete {
            kind,
            key: rest.to_string(),
        });
    }

    let (key, value) = rest
        .split_once('=')
        .ok_or_else(|| format!("expected kind:key=value in {:?}", arg))?;
    if key.is_empty() {
        return Err(format!("missing key in {:?}", arg));
    }
    Ok(Mutation::Set {
        kind,
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Initialize logging based on log level
fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok(); // Ignore error if already initialized
}

/// Apply one mutation to a clone of the parsed component and rebuild
fn apply(component: &Component, mutation: &Mutation) -> Result<HttpRequest, String> {
    let mut working = component.clone();
    let result = match mutation {
        Mutation::Set { key, value, .. } => working.set_value(key, value),
        Mutation::Delete { key, .. } => working.delete(key),
    };
    result.map_err(|e| e.to_string())?;
    working.rebuild().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() {
    let matches = Command::new("surface")
        .version("1.0.0")
        .author("Jake Abendroth")
        .about("Enumerate and mutate the fuzzable surface of a captured HTTP request")
        .after_help("EXAMPLES:\n  surface --request login.txt\n  surface -r login.txt --set body:user.id=1337 --delete cookie:session\n  surface -r login.txt --config surface.json --set query:page=-1 --send")
        .arg(Arg::new("request")
            .short('r')
            .long("request")
            .required(true)
            .num_args(1)
            .help("Path to a raw HTTP/1.x request dump"))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .num_args(1)
            .help("JSON file with extra protected keys and component kinds"))
        .arg(Arg::new("scheme")
            .long("scheme")
            .num_args(1)
            .default_value("https")
            .help("Scheme used to resolve relative request targets"))
        .arg(Arg::new("set")
            .short('s')
            .long("set")
            .num_args(1)
            .action(ArgAction::Append)
            .help("Overwrite a key: kind:key=value (kind is cookie, header, query, path or body)"))
        .arg(Arg::new("delete")
            .short('d')
            .long("delete")
            .num_args(1)
            .action(ArgAction::Append)
            .help("Remove a key: kind:key"))
        .arg(Arg::new("send")
            .long("send")
            .action(ArgAction::SetTrue)
            .help("Send every rebuilt request and print the response status"))
        .arg(Arg::new("log_level")
            .long("log-level")
            .num_args(1)
            .default_value("warn")
            .help("Log filter when RUST_LOG is unset"))
        .get_matches();

    let log_level = matches.get_one::<String>("log_level").map(|s| s.as_str()).unwrap_or("warn");
    init_logging(log_level);

    let request_path = matches.get_one::<String>("request").expect("request is required");
    let scheme = matches.get_one::<String>("scheme").map(|s| s.as_str()).unwrap_or("https");
    let send = matches.get_flag("send");

    let config = match matches.get_one::<String>("config") {
        Some(path) => SurfaceConfig::from_file(path).unwrap_or_else(|e| {
            eprintln!("Failed to load config {}: {}", path, e);
            std::process::exit(2);
        }),
        None => SurfaceConfig::default(),
    };

    let mut mutations = Vec::new();
    let sets = matches.get_many::<String>("set").into_iter().flatten().map(|s| (s, false));
    let deletes = matches.get_many::<String>("delete").into_iter().flatten().map(|s| (s, true));
    for (arg, delete) in sets.chain(deletes) {
        match parse_mutation(arg, delete) {
            Ok(mutation) => mutations.push(mutation),
            Err(e) => {
                eprintln!("Invalid mutation: {}", e);
                std::process::exit(2);
            }
        }
    }

    let raw = fs::read_to_string(request_path).unwrap_or_else(|e| {
        eprintln!("Failed to read {}: {}", request_path, e);
        std::process::exit(1);
    });
    let request = HttpRequest::from_raw_with_scheme(&raw, scheme).unwrap_or_else(|e| {
        eprintln!("Failed to parse request: {}", e);
        std::process::exit(1);
    });
    debug!(method = %request.method, url = %request.url, "loaded request");

    let mut components = config.components().unwrap_or_else(|e| {
        eprintln!("Invalid config: {}", e);
        std::process::exit(2);
    });

    // Enumerate the surface
    let mut parsed = Vec::new();
    for mut component in components.drain(..) {
        match component.parse(&request) {
            Ok(true) => {
                println!("[{}]", component.name());
                if let Err(e) = component.iterate(|key, value| {
                    println!("  {} = {}", key, display_value(value));
                    Ok::<(), doppel_surface::ComponentError>(())
                }) {
                    warn!(component = component.name(), error = %e, "iteration failed");
                }
                parsed.push(component);
            }
            Ok(false) => debug!(component = component.name(), "component absent"),
            Err(e) => println!("[{}] skipped: {}", component.name(), e),
        }
    }

    // Rebuild one request per mutation; each starts from the baseline
    let mut rebuilt = Vec::new();
    for mutation in &mutations {
        let Some(component) = parsed.iter().find(|c| c.kind() == mutation.kind()) else {
            println!("[ERROR] {:?}: {} component not present in request", mutation, mutation.kind());
            continue;
        };
        match apply(component, mutation) {
            Ok(req) => {
                println!("\n--- {:?}\n{}", mutation, req.to_raw());
                rebuilt.push(req);
            }
            Err(e) => println!("[ERROR] {:?}: {}", mutation, e),
        }
    }

    if send {
        let engine = AttackEngine::new().unwrap_or_else(|e| {
            eprintln!("Failed to build HTTP client: {}", e);
            std::process::exit(1);
        });
        let targets = if rebuilt.is_empty() { vec![request.clone()] } else { rebuilt };
        for req in &targets {
            match engine.send(req).await {
                Ok(resp) => println!("[{}] {} {}", resp.status().as_u16(), req.method, req.url),
                Err(e) => println!("[ERROR] {} {}: {}", req.method, req.url, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_set_mutation() {
        let mutation = parse_mutation("body:user.id=1=1", false).unwrap();
        assert_eq!(
            mutation,
            Mutation::Set {
                kind: ComponentKind::Body,
                key: "user.id".to_string(),
                value: "1=1".to_string(),
            }
        );
    }

    #[test]
    fn parse_delete_mutation() {
        let mutation = parse_mutation("Cookie:session", true).unwrap();
        assert_eq!(
            mutation,
            Mutation::Delete {
                kind: ComponentKind::Cookie,
                key: "session".to_string(),
            }
        );
    }

    #[test]
    fn parse_mutation_errors() {
        assert!(parse_mutation("session=1", false).is_err());
        assert!(parse_mutation("fragment:a=1", false).is_err());
        assert!(parse_mutation("query:a", false).is_err());
        assert!(parse_mutation("query:", true).is_err());
    }

    #[test]
    fn apply_leaves_baseline_untouched() {
        let req = HttpRequest::from_raw("GET /p?a=1 HTTP/1.1\r\nHost: example.com\r\n\r\n").unwrap();
        let mut component = Component::new(ComponentKind::Query, Default::default());
        component.parse(&req).unwrap();

        let rebuilt = apply(&component, &Mutation::Set {
            kind: ComponentKind::Query,
            key: "a".to_string(),
            value: "2".to_string(),
        })
        .unwrap();
        assert_eq!(rebuilt.url.query(), Some("a=2"));
        assert_eq!(component.rebuild().unwrap().url.query(), Some("a=1"));
    }
}
