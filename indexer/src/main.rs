use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use folio_core::persist::{load_config, open_sled, upload_ref, DataPaths};
use folio_core::source::TextFileSource;
use folio_core::{DocId, DocumentDraft, DocumentStatus, Engine, FolioConfig};
use rayon::prelude::*;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

/// One record of a `.json` / `.jsonl` manifest.
#[derive(Debug, Deserialize)]
struct InputDoc {
    title: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    subject: String,
    #[serde(default)]
    isbn: String,
    body: String,
}

impl InputDoc {
    fn draft(&self) -> DocumentDraft {
        DocumentDraft {
            title: self.title.clone(),
            author: self.author.clone(),
            subject: self.subject.clone(),
            isbn: self.isbn.clone(),
        }
    }
}

#[derive(Parser)]
#[command(name = "folio-indexer")]
#[command(about = "Ingest, search and maintain a folio library", long_about = None)]
struct Cli {
    /// Library directory (index + uploads)
    #[arg(long, global = true, default_value = "./data")]
    data_dir: PathBuf,
    /// Engine config JSON; defaults to <data-dir>/folio.json when present
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest .txt files or .json/.jsonl manifests from a file or directory
    Ingest {
        /// Input path (file or directory)
        #[arg(long)]
        input: PathBuf,
        /// Title for a single .txt input; defaults to the file stem
        #[arg(long)]
        title: Option<String>,
        #[arg(long, default_value = "")]
        author: String,
        #[arg(long, default_value = "")]
        subject: String,
        #[arg(long, default_value = "")]
        isbn: String,
    },
    /// Run a keyword query
    Search {
        query: String,
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Remove a document and its postings
    Remove { id: DocId },
    /// Rebuild the postings of a document from its stored text
    Reindex { id: DocId },
    /// List catalogued documents
    List {
        /// active, indexing, failed; all when omitted
        #[arg(long)]
        status: Option<DocumentStatus>,
    },
    /// Print library statistics
    Stats,
}

struct Library {
    engine: Engine,
    uploads: Arc<TextFileSource>,
}

impl Library {
    fn open(data_dir: &Path, config: Option<&Path>) -> Result<Self> {
        let paths = DataPaths::new(data_dir);
        let config: FolioConfig = load_config(&paths, config).context("loading config")?;
        let store = open_sled(&paths).with_context(|| format!("opening index at {}", paths.index().display()))?;
        let uploads = Arc::new(TextFileSource::new(paths.uploads(), config.indexing.page_chars));
        let engine = Engine::new(Arc::new(store), uploads.clone(), &config)?;
        Ok(Self { engine, uploads })
    }

    /// Copy `text` into the uploads dir and index it under a fresh id.
    fn add(&self, draft: DocumentDraft, text: &str) -> Result<(DocId, usize)> {
        let id = self.engine.allocate_id()?;
        let storage_ref = upload_ref(id);
        self.uploads.save(&storage_ref, text.as_bytes())?;
        match self.engine.ingest(id, draft, storage_ref.clone()) {
            Ok(summary) => Ok((id, summary.words_indexed)),
            Err(e) => {
                if matches!(e, folio_core::FolioError::Validation(_)) {
                    let _ = self.uploads.delete(&storage_ref);
                }
                Err(e.into())
            }
        }
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let library = Library::open(&cli.data_dir, cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest { input, title, author, subject, isbn } => {
            let defaults = DocumentDraft { title: title.unwrap_or_default(), author, subject, isbn };
            ingest(&library, &input, defaults)
        }
        Commands::Search { query, limit } => {
            let results = library.engine.search(&query, limit)?;
            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }
        Commands::Remove { id } => {
            let doc = library.engine.remove(id)?;
            if let Err(e) = library.uploads.delete(&doc.storage_ref) {
                tracing::warn!(id, error = %e, "could not delete uploaded file");
            }
            library.engine.sweep_orphans();
            println!("removed {} ({})", id, doc.title);
            Ok(())
        }
        Commands::Reindex { id } => {
            let summary = library.engine.reindex(id)?;
            println!("reindexed {id}: {} words", summary.words_indexed);
            Ok(())
        }
        Commands::List { status } => {
            for doc in library.engine.documents(status)? {
                println!("{}\t{}\t{}\t{}\t{} pages", doc.id, doc.status.as_str(), doc.title, doc.author, doc.total_pages);
            }
            Ok(())
        }
        Commands::Stats => {
            println!("{}", serde_json::to_string_pretty(&library.engine.stats()?)?);
            Ok(())
        }
    }
}

enum Job {
    Text { path: PathBuf, draft: DocumentDraft },
    Record { origin: String, doc: InputDoc },
}

fn ingest(library: &Library, input: &Path, defaults: DocumentDraft) -> Result<()> {
    let files = collect_inputs(input)?;
    if files.is_empty() {
        bail!("no .txt, .json or .jsonl files under {}", input.display());
    }
    let single = files.len() == 1;

    let mut jobs = Vec::new();
    for file in files {
        match extension(&file).as_deref() {
            Some("jsonl") => jobs.extend(read_jsonl(&file)?.into_iter().map(|(origin, doc)| Job::Record { origin, doc })),
            Some("json") => jobs.extend(read_json(&file)?.into_iter().map(|(origin, doc)| Job::Record { origin, doc })),
            _ => {
                let mut draft = defaults.clone();
                if !single || draft.title.trim().is_empty() {
                    draft.title = file_title(&file);
                }
                jobs.push(Job::Text { path: file, draft });
            }
        }
    }

    // One failing document must not stop the others.
    let outcomes: Vec<(String, Result<(DocId, usize)>)> = jobs
        .into_par_iter()
        .map(|job| match job {
            Job::Text { path, draft } => {
                let origin = path.display().to_string();
                let outcome = std::fs::read_to_string(&path)
                    .with_context(|| format!("reading {origin}"))
                    .and_then(|text| library.add(draft, &text));
                (origin, outcome)
            }
            Job::Record { origin, doc } => {
                let outcome = library.add(doc.draft(), &doc.body);
                (origin, outcome)
            }
        })
        .collect();

    let mut failed = 0;
    for (origin, outcome) in &outcomes {
        match outcome {
            Ok((id, words)) => tracing::info!(id, words, origin = %origin, "ingested"),
            Err(e) => {
                failed += 1;
                tracing::error!(origin = %origin, error = %e, "ingest failed");
            }
        }
    }
    tracing::info!(total = outcomes.len(), failed, "ingest complete");
    if failed == outcomes.len() {
        bail!("all {failed} documents failed to ingest");
    }
    Ok(())
}

fn collect_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p).as_deref(), Some("txt" | "json" | "jsonl")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        bail!("input {} does not exist", input.display());
    }
    Ok(files)
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase)
}

fn file_title(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("untitled").replace(['_', '-'], " ")
}

fn read_jsonl(file: &Path) -> Result<Vec<(String, InputDoc)>> {
    let reader = BufReader::new(File::open(file)?);
    let mut docs = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let origin = format!("{}:{}", file.display(), n + 1);
        let doc: InputDoc = serde_json::from_str(&line).with_context(|| format!("parsing {origin}"))?;
        docs.push((origin, doc));
    }
    Ok(docs)
}

fn read_json(file: &Path) -> Result<Vec<(String, InputDoc)>> {
    let reader = BufReader::new(File::open(file)?);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let origin = file.display().to_string();
    match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .enumerate()
            .map(|(i, v)| -> Result<(String, InputDoc)> { Ok((format!("{origin}[{i}]"), serde_json::from_value(v)?)) })
            .collect(),
        serde_json::Value::Object(_) => Ok(vec![(origin, serde_json::from_value(json)?)]),
        _ => bail!("{origin}: expected an object or an array of objects"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn titles_come_from_file_stems() {
        assert_eq!(file_title(Path::new("/tmp/radar_systems-vol-2.txt")), "radar systems vol 2");
    }

    #[test]
    fn reads_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let jsonl = dir.path().join("books.jsonl");
        std::fs::write(&jsonl, "{\"title\":\"A\",\"body\":\"radar\"}\n\n{\"title\":\"B\",\"author\":\"X\",\"body\":\"sonar\"}\n").unwrap();
        let docs = read_jsonl(&jsonl).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1].1.author, "X");
        assert!(docs[1].0.ends_with(":3"));

        let json = dir.path().join("one.json");
        std::fs::write(&json, "{\"title\":\"C\",\"body\":\"missile\"}").unwrap();
        assert_eq!(read_json(&json).unwrap()[0].1.title, "C");
    }

    #[test]
    fn ingests_a_directory_and_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("radar_book.txt"), "radar radar\u{c}missile").unwrap();
        std::fs::write(input.join("blank.txt"), "   ").unwrap();
        std::fs::write(input.join("notes.md"), "radar").unwrap();

        let library = Library::open(&dir.path().join("lib"), None).unwrap();
        ingest(&library, &input, DocumentDraft::default()).unwrap();

        let out = library.engine.search("radar", None).unwrap();
        assert_eq!(out.total_results, 1);
        assert_eq!(out.results[0].title, "radar book");
        assert_eq!(out.results[0].pages, vec![1]);
        assert_eq!(library.engine.documents(Some(DocumentStatus::Active)).unwrap().len(), 1);
    }
}
