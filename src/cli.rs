//! Command-line front end for the client.
//!
//! [`Cli`] is the argument surface of the `searchd_cli` binary; [`run`] executes one
//! parsed invocation against a [`Client`] and prints to the given writer. The `shell`
//! subcommand keeps a persistent session open and reads searches line by line through
//! [`prompt`].
use std::{
    collections::BTreeMap,
    error,
    io::{self, BufRead, Write},
    time::Duration,
};

use clap::{Args, Parser, Subcommand};

use crate::{
    client::Client,
    config::ClientConfig,
    error::Result,
    protocol::{AttrValue, AttributeUpdate, ExcerptOptions, ResultSet, request::UpdateValues},
    query::{MatchMode, QueryBuilder, QueryDescriptor, RankingMode, SortMode},
};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Daemon address, `host:port` or a socket path. Repeat for failover.
    #[arg(long = "server", short = 's', default_value = "localhost:3312")]
    pub servers: Vec<String>,
    /// Connect timeout in milliseconds, 0 for none
    #[arg(long, default_value_t = 0)]
    pub connect_timeout: u64,
    /// Connection attempts, spread across servers
    #[arg(long, default_value_t = 1)]
    pub connect_retries: u32,
    /// Request timeout in milliseconds, 0 for none
    #[arg(long, default_value_t = 0)]
    pub request_timeout: u64,
    /// Request attempts on the same server
    #[arg(long, default_value_t = 1)]
    pub request_retries: u32,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a full-text search
    Search(SearchArgs),
    /// Build highlighted snippets for documents
    Excerpts {
        #[arg(long, default_value = "*")]
        index: String,
        /// Words to highlight
        words: String,
        /// Document texts
        #[arg(required = true)]
        docs: Vec<String>,
        #[arg(long)]
        exact_phrase: bool,
        #[arg(long)]
        single_passage: bool,
    },
    /// Show how a query is tokenized
    Keywords {
        #[arg(long, default_value = "*")]
        index: String,
        query: String,
        /// Include per-keyword document and hit counts
        #[arg(long)]
        hits: bool,
    },
    /// Update integer attributes of documents in place
    Update {
        index: String,
        /// Attribute names, in value order
        #[arg(long = "attr", required = true)]
        attrs: Vec<String>,
        /// `id=value,value,...`, one value per attribute
        #[arg(long = "doc", required = true, value_parser = parse_doc)]
        docs: Vec<(u64, Vec<u32>)>,
    },
    /// Print the status table of every server
    Status,
    /// Flush attribute updates to disk
    Flush,
    /// Interactive searches over a persistent connection
    Shell {
        #[arg(long, default_value = "*")]
        index: String,
    },
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    pub query: String,
    #[arg(long, default_value = "*")]
    pub index: String,
    #[arg(long, default_value_t = 0)]
    pub offset: u32,
    #[arg(long, default_value_t = 20)]
    pub limit: u32,
    /// all, any, phrase, boolean, extended, fullscan or extended2
    #[arg(long = "mode", default_value = "all")]
    pub match_mode: MatchMode,
    #[arg(long)]
    pub ranker: Option<RankingMode>,
    /// Sort clause; requires --sort-mode other than relevance
    #[arg(long)]
    pub sort_by: Option<String>,
    #[arg(long, default_value = "relevance")]
    pub sort_mode: SortMode,
    /// `attr=value,value,...`
    #[arg(long = "filter", value_parser = parse_filter)]
    pub filters: Vec<(String, Vec<i64>)>,
    #[arg(long, default_value = "*")]
    pub select: String,
}

impl SearchArgs {
    pub fn descriptor(&self) -> Result<QueryDescriptor> {
        let mut builder = QueryBuilder::new(&self.query)
            .index(&self.index)
            .limits(self.offset, self.limit, 0, 0)
            .match_mode(self.match_mode)
            .sort_mode(self.sort_mode, self.sort_by.clone().unwrap_or_default())
            .select(&self.select);
        if let Some(ranker) = self.ranker {
            builder = builder.ranking_mode(ranker);
        }
        for (attr, values) in &self.filters {
            builder = builder.filter(attr, values.clone(), false);
        }
        builder.build()
    }
}

fn parse_filter(s: &str) -> std::result::Result<(String, Vec<i64>), String> {
    let (attr, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected attr=values, got '{s}'"))?;
    let values = values
        .split(',')
        .map(|v| v.trim().parse::<i64>().map_err(|e| format!("'{v}': {e}")))
        .collect::<std::result::Result<_, _>>()?;
    Ok((attr.to_string(), values))
}

fn parse_doc(s: &str) -> std::result::Result<(u64, Vec<u32>), String> {
    let (id, values) = s
        .split_once('=')
        .ok_or_else(|| format!("expected id=values, got '{s}'"))?;
    let id = id.trim().parse::<u64>().map_err(|e| format!("'{id}': {e}"))?;
    let values = values
        .split(',')
        .map(|v| v.trim().parse::<u32>().map_err(|e| format!("'{v}': {e}")))
        .collect::<std::result::Result<_, _>>()?;
    Ok((id, values))
}

impl Cli {
    pub fn config(&self) -> Result<ClientConfig> {
        let connect = Duration::from_millis(self.connect_timeout);
        let request = Duration::from_millis(self.request_timeout);
        ClientConfig::default()
            .with_servers(&self.servers)?
            .with_connect_timeout(connect, self.connect_retries)?
            .with_request_timeout(request, self.request_retries)
    }
}

type CliResult = std::result::Result<(), Box<dyn error::Error>>;

/// Line read by the interactive shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShellCommand {
    /// `.exit` or end of input
    Exit,
    /// `.status`
    Status,
    /// Anything not starting with a dot is a search query.
    Search(String),
}

/// Prompts for and reads one shell line.
pub fn prompt<R, W>(mut reader: R, mut writer: W) -> std::result::Result<ShellCommand, String>
where
    R: BufRead,
    W: Write,
{
    let mut s = String::default();
    write!(&mut writer, "> ")
        .and_then(|_| writer.flush())
        .map_err(|e| format!("failed to write prompt: {e}"))?;

    let read = reader
        .read_line(&mut s)
        .map_err(|e| format!("failed to read input: {e}"))?;
    if read == 0 {
        return Ok(ShellCommand::Exit);
    }

    match s.trim_end() {
        ".exit" => Ok(ShellCommand::Exit),
        ".status" => Ok(ShellCommand::Status),
        s if !s.starts_with('.') => Ok(ShellCommand::Search(s.to_string())),
        s => Err(format!("unrecognized command '{}'", s)),
    }
}

pub fn print_result<W: Write>(result: &ResultSet, out: &mut W) -> std::io::Result<()> {
    if !result.warning.is_empty() {
        writeln!(out, "warning: {}", result.warning)?;
    }
    writeln!(
        out,
        "{} of {} matches in {:.3}s",
        result.total,
        result.total_found,
        result.time()
    )?;
    for (i, m) in result.matches.iter().enumerate() {
        write!(out, "{}. id={} weight={}", i + 1, m.id, m.weight)?;
        for (name, value) in &m.attrs {
            write!(out, " {name}=")?;
            match value {
                AttrValue::Int(v) => write!(out, "{v}")?,
                AttrValue::BigInt(v) => write!(out, "{v}")?,
                AttrValue::Float(v) => write!(out, "{v}")?,
                AttrValue::String(v) => write!(out, "{v:?}")?,
                AttrValue::Multi(v) => {
                    let items: Vec<String> = v.iter().map(u32::to_string).collect();
                    write!(out, "({})", items.join(","))?;
                }
            }
        }
        writeln!(out)?;
    }
    for (word, stats) in &result.words {
        writeln!(out, "word '{word}': {} documents, {} hits", stats.docs, stats.hits)?;
    }
    Ok(())
}

fn print_status<W: Write>(client: &mut Client, out: &mut W) -> io::Result<()> {
    for status in client.status() {
        writeln!(out, "== {}", status.endpoint)?;
        match status.result {
            Ok(rows) => {
                for row in rows {
                    writeln!(out, "{}", row.join("\t"))?;
                }
            }
            Err(e) => writeln!(out, "error: {e}")?,
        }
    }
    Ok(())
}

fn shell<R, W>(client: &mut Client, index: &str, mut input: R, out: &mut W) -> CliResult
where
    R: BufRead,
    W: Write,
{
    client.open()?;
    loop {
        let cmd = match prompt(&mut input, &mut *out) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };
        match cmd {
            ShellCommand::Exit => break,
            ShellCommand::Status => print_status(client, out)?,
            ShellCommand::Search(q) => {
                let query = QueryBuilder::new(q).index(index).build()?;
                match client.query(&query) {
                    Ok(result) => print_result(&result, out)?,
                    Err(e) => eprintln!("query error: {e}"),
                }
            }
        }
    }
    client.close()?;
    Ok(())
}

/// Executes one invocation; `input` feeds the interactive shell.
pub fn run<R: BufRead, W: Write>(cli: Cli, input: R, out: &mut W) -> CliResult {
    let mut client = Client::new(cli.config()?)?;

    match cli.command {
        Commands::Search(args) => {
            let result = client.query(&args.descriptor()?)?;
            print_result(&result, out)?;
        }
        Commands::Excerpts {
            index,
            words,
            docs,
            exact_phrase,
            single_passage,
        } => {
            let opts = ExcerptOptions {
                exact_phrase,
                single_passage,
                ..Default::default()
            };
            for excerpt in client.build_excerpts(&docs, &index, &words, &opts)? {
                writeln!(out, "{excerpt}")?;
            }
        }
        Commands::Keywords { index, query, hits } => {
            for keyword in client.build_keywords(&query, &index, hits)? {
                write!(out, "{} -> {}", keyword.tokenized, keyword.normalized)?;
                match keyword.stats {
                    Some(s) => writeln!(out, " ({} docs, {} hits)", s.docs, s.hits)?,
                    None => writeln!(out)?,
                }
            }
        }
        Commands::Update { index, attrs, docs } => {
            let values: BTreeMap<u64, Vec<u32>> = docs.into_iter().collect();
            let update = AttributeUpdate::new(attrs, UpdateValues::Scalar(values))?;
            let updated = client.update_attributes(&index, &update)?;
            writeln!(out, "{updated} documents updated")?;
        }
        Commands::Status => print_status(&mut client, out)?,
        Commands::Flush => {
            let tag = client.flush_attributes()?;
            writeln!(out, "flush tag {tag}")?;
        }
        Commands::Shell { index } => shell(&mut client, &index, input, out)?,
    }

    if !client.last_warning().is_empty() {
        eprintln!("warning: {}", client.last_warning());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_prints_correctly() {
        let input = b".exit\n";
        let mut output = Vec::new();

        prompt(&input[..], &mut output).unwrap();

        let output = String::from_utf8(output).expect("not valid UTF-8");
        assert_eq!("> ", output);
    }

    #[test]
    fn prompt_handles_searches() {
        let input = b"hello world\n";
        let mut output = Vec::new();

        let res = prompt(&input[..], &mut output).unwrap();
        assert_eq!(ShellCommand::Search("hello world".into()), res);
    }

    #[test]
    fn prompt_end_of_input_exits() {
        let mut output = Vec::new();
        assert_eq!(prompt(&b""[..], &mut output).unwrap(), ShellCommand::Exit);
    }

    #[test]
    fn prompt_unrecognized_command() {
        let input = b".something_wrong\n";
        let mut output = Vec::new();

        let err = prompt(&input[..], &mut output).unwrap_err();
        assert_eq!(err, "unrecognized command '.something_wrong'");
    }

    #[test]
    fn global_flags_build_config() {
        let cli = Cli::try_parse_from([
            "searchd_cli",
            "--server",
            "a:1",
            "--server",
            "/tmp/searchd.sock",
            "--connect-retries",
            "3",
            "--request-timeout",
            "1500",
            "status",
        ])
        .unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.endpoints.len(), 2);
        assert_eq!(config.connect_retries, 3);
        assert_eq!(config.request_timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.connect_timeout, None);
    }

    #[test]
    fn search_args_to_descriptor() {
        let cli = Cli::try_parse_from([
            "searchd_cli",
            "search",
            "hello",
            "--index",
            "articles",
            "--mode",
            "extended2",
            "--filter",
            "group_id=1,2",
            "--limit",
            "5",
        ])
        .unwrap();
        let Commands::Search(args) = cli.command else {
            panic!("expected search");
        };
        let query = args.descriptor().unwrap();
        assert_eq!(query.index, "articles");
        assert_eq!(query.match_mode, MatchMode::Extended2);
        assert_eq!(query.limit, 5);
        assert_eq!(query.filters.len(), 1);
    }

    #[test]
    fn bad_filter_rejected() {
        let res = Cli::try_parse_from(["searchd_cli", "search", "q", "--filter", "group_id"]);
        assert!(res.is_err());
    }

    #[test]
    fn update_docs_parse() {
        assert_eq!(parse_doc("7=1,2").unwrap(), (7, vec![1, 2]));
        assert!(parse_doc("x=1").is_err());
    }
}
