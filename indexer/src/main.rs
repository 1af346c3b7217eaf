use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use postfeed_core::index::InvertedIndex;
use postfeed_core::persist::{load_meta, save_meta, GraphPaths, MetaFile, SledGraph};
use postfeed_core::{props, Label, NodeId, NodeRecord, RelType, Timestamp};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

/// One line (JSONL) or array element (JSON) of a dump.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum InputRecord {
    User {
        username: String,
        name: String,
        #[serde(default)]
        hash: String,
    },
    Post {
        /// Key other records use to refer to this post.
        key: String,
        author: String,
        status: String,
        time: Timestamp,
        #[serde(default)]
        extra: Map<String, Value>,
    },
    Like { user: String, post: String },
    Repost { user: String, post: String },
    Reply { reply: String, post: String },
}

#[derive(Parser)]
#[command(name = "postfeed-indexer")]
#[command(about = "Build the post store and term index served by postfeed-server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the store from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output store directory
        #[arg(long)]
        output: String,
    },
    /// Print the metadata of a built store
    Info {
        #[arg(long)]
        store: String,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output } => build_store(Path::new(&input), &output).map(|_| ()),
        Commands::Info { store } => {
            let meta = load_meta(&GraphPaths::new(&store))?;
            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }
    }
}

/// Ids are handed out in ingestion order, so later records get higher ids.
#[derive(Default)]
struct Ingest {
    next_id: NodeId,
    users: HashMap<String, NodeId>,
    posts: HashMap<String, NodeId>,
    num_posts: u64,
    index: InvertedIndex,
}

impl Ingest {
    fn allocate(&mut self) -> NodeId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn user(&self, username: &str) -> Result<NodeId> {
        self.users.get(username).copied().with_context(|| format!("unknown user `{username}`"))
    }

    fn post(&self, key: &str) -> Result<NodeId> {
        self.posts.get(key).copied().with_context(|| format!("unknown post `{key}`"))
    }

    fn apply(&mut self, graph: &SledGraph, record: InputRecord) -> Result<()> {
        match record {
            InputRecord::User { username, name, hash } => {
                if self.users.contains_key(&username) {
                    bail!("duplicate user `{username}`");
                }
                let id = self.allocate();
                let mut p = Map::new();
                p.insert(props::USERNAME.into(), Value::from(username.clone()));
                p.insert(props::NAME.into(), Value::from(name));
                p.insert(props::HASH.into(), Value::from(hash));
                graph.put_node(id, &NodeRecord::new(Label::User, p))?;
                graph.put_user_name(&username, id)?;
                self.users.insert(username, id);
            }
            InputRecord::Post { key, author, status, time, extra } => {
                if self.posts.contains_key(&key) {
                    bail!("duplicate post key `{key}`");
                }
                let author = self.user(&author)?;
                let id = self.allocate();
                let mut p = extra;
                p.insert(props::STATUS.into(), Value::from(status.clone()));
                p.insert(props::TIME.into(), Value::from(time));
                graph.put_node(id, &NodeRecord::new(Label::Post, p))?;
                graph.put_edge(author, id, RelType::Posted)?;
                self.index.add_document(id, &status);
                self.posts.insert(key, id);
                self.num_posts += 1;
            }
            InputRecord::Like { user, post } => graph.put_edge(self.user(&user)?, self.post(&post)?, RelType::Likes)?,
            InputRecord::Repost { user, post } => {
                graph.put_edge(self.user(&user)?, self.post(&post)?, RelType::Reposted)?
            }
            InputRecord::Reply { reply, post } => {
                graph.put_edge(self.post(&reply)?, self.post(&post)?, RelType::RepliedTo)?
            }
        }
        Ok(())
    }
}

fn input_files(input: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(p.extension().and_then(|s| s.to_str()), Some("json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    }
    files
}

fn read_records(file: &Path) -> Result<Vec<InputRecord>> {
    let reader = BufReader::new(File::open(file)?);
    if file.extension().and_then(|s| s.to_str()) == Some("jsonl") {
        let mut out = Vec::new();
        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() { continue; }
            out.push(serde_json::from_str(&line).with_context(|| format!("{}:{}", file.display(), n + 1))?);
        }
        return Ok(out);
    }
    let json: Value = serde_json::from_reader(reader)?;
    match json {
        Value::Array(arr) => Ok(arr.into_iter().map(serde_json::from_value).collect::<Result<Vec<_>, _>>()?),
        Value::Object(_) => Ok(vec![serde_json::from_value(json)?]),
        _ => Ok(Vec::new()),
    }
}

fn build_store(input: &Path, output: &str) -> Result<MetaFile> {
    let paths = GraphPaths::new(output);
    let graph = SledGraph::open(&paths)?;
    if !graph.is_empty() {
        tracing::info!(output, "output store is not empty, rebuilding from scratch");
        graph.clear()?;
    }
    let mut ingest = Ingest::default();

    for file in input_files(input) {
        for record in read_records(&file)? {
            ingest.apply(&graph, record)?;
        }
    }
    tracing::info!(nodes = ingest.next_id, posts = ingest.num_posts, terms = ingest.index.num_terms(), "ingested records");

    for (term, ids) in ingest.index.iter() {
        let ids: Vec<NodeId> = ids.iter().copied().collect();
        graph.put_postings(term, &ids)?;
    }
    graph.flush()?;

    let meta = MetaFile {
        num_nodes: ingest.next_id,
        num_posts: ingest.num_posts,
        created_at: time::OffsetDateTime::now_utc().format(&time::format_description::well_known::Rfc3339).unwrap_or_else(|_| "".into()),
        version: 1,
    };
    save_meta(&paths, &meta)?;

    tracing::info!(output, "store build complete");
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use postfeed_core::index::IndexGateway;
    use postfeed_core::store::GraphView;
    use postfeed_core::Direction;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn builds_store_from_jsonl() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dump.jsonl");
        fs::write(
            &input,
            [
                r#"{"type":"user","username":"max","name":"Max","hash":"h"}"#,
                r#"{"type":"user","username":"jexp","name":"Michael"}"#,
                r#"{"type":"post","key":"p1","author":"max","status":"Graphs everywhere","time":10}"#,
                r#"{"type":"post","key":"p2","author":"jexp","status":"graph reply","time":20,"extra":{"lang":"en"}}"#,
                r#"{"type":"like","user":"jexp","post":"p1"}"#,
                r#"{"type":"repost","user":"jexp","post":"p1"}"#,
                r#"{"type":"reply","reply":"p2","post":"p1"}"#,
            ]
            .join("\n"),
        )
        .unwrap();
        let out = dir.path().join("store");
        let meta = build_store(&input, out.to_str().unwrap()).unwrap();
        assert_eq!(meta.num_nodes, 4);
        assert_eq!(meta.num_posts, 2);

        let graph = SledGraph::open(&GraphPaths::new(&out)).unwrap();
        assert_eq!(graph.match_term("graph").unwrap(), vec![2, 3]);
        assert_eq!(graph.highest_id_in_use().unwrap(), Some(3));
        assert_eq!(graph.resolve_user("jexp").unwrap(), Some(1));
        assert_eq!(graph.degree(2, None, Direction::Incoming).unwrap(), 4);
        assert_eq!(graph.node(3).unwrap().unwrap().str_prop("lang"), Some("en"));
        assert_eq!(load_meta(&GraphPaths::new(&out)).unwrap().num_posts, 2);
    }

    #[test]
    fn rebuilding_into_the_same_output_replaces_the_store() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dump.jsonl");
        let dump = [
            r#"{"type":"user","username":"max","name":"Max"}"#,
            r#"{"type":"user","username":"jexp","name":"Michael"}"#,
            r#"{"type":"post","key":"p1","author":"max","status":"graphs again","time":10}"#,
            r#"{"type":"like","user":"jexp","post":"p1"}"#,
        ];
        fs::write(&input, dump.join("\n")).unwrap();
        let out = dir.path().join("store");
        build_store(&input, out.to_str().unwrap()).unwrap();
        build_store(&input, out.to_str().unwrap()).unwrap();

        let graph = SledGraph::open(&GraphPaths::new(&out)).unwrap();
        assert_eq!(graph.degree(2, Some(RelType::Posted), Direction::Incoming).unwrap(), 1);
        assert_eq!(graph.degree(2, Some(RelType::Likes), Direction::Incoming).unwrap(), 1);
        assert_eq!(graph.degree(0, None, Direction::Outgoing).unwrap(), 1);
        drop(graph);

        fs::write(&input, [dump[0], r#"{"type":"post","key":"p9","author":"max","status":"coffee","time":5}"#].join("\n"))
            .unwrap();
        let meta = build_store(&input, out.to_str().unwrap()).unwrap();
        assert_eq!(meta.num_nodes, 2);
        let graph = SledGraph::open(&GraphPaths::new(&out)).unwrap();
        assert!(graph.match_term("graph").unwrap().is_empty());
        assert_eq!(graph.match_term("coffee").unwrap(), vec![1]);
        assert_eq!(graph.resolve_user("jexp").unwrap(), None);
        assert_eq!(graph.highest_id_in_use().unwrap(), Some(1));
    }

    #[test]
    fn rejects_edges_to_unknown_posts() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("dump.json");
        fs::write(&input, r#"[{"type":"user","username":"a","name":"A"},{"type":"like","user":"a","post":"nope"}]"#).unwrap();
        let err = build_store(&input, dir.path().join("store").to_str().unwrap()).unwrap_err();
        assert!(err.to_string().contains("unknown post"));
    }
}
