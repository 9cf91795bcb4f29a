use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use notebook_sync::api::model::{ChatRequest, Credentials};
use notebook_sync::autosave::Autosaver;
use notebook_sync::config;
use notebook_sync::{HttpNotebookApi, NewNotebook, NotebookStore, NotebookUpdate, PageUpdate};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List notebooks, newest first
    Notebooks,
    /// Show one notebook with its pages
    Show { id: String },
    /// List the pages of a notebook
    Pages { id: String },
    /// Create a notebook from a title and/or a prompt
    Create {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        prompt: Option<String>,
    },
    /// Rename a notebook
    Rename { id: String, title: String },
    /// Change a notebook's description
    Describe { id: String, description: String },
    /// Delete a notebook
    Delete { id: String },
    /// Add a blank page to a notebook
    AddPage { id: String },
    /// Rename a page
    RenamePage {
        notebook: String,
        page: String,
        title: String,
    },
    /// Replace a page's content with a JSON document read from stdin
    SetContent { notebook: String, page: String },
    /// Delete a page
    DeletePage { notebook: String, page: String },
    /// Word count and reading time of a page
    Stats { notebook: String, page: String },
    /// List flashcards, optionally for one notebook
    Flashcards {
        #[arg(long)]
        notebook: Option<String>,
    },
    /// Answer a flashcard
    Answer { card: String, answer: String },
    /// Ask the assistant about a page
    Chat {
        notebook: String,
        page: String,
        message: String,
    },
    /// Show the account the configured token belongs to
    Whoami,
    /// Log in and print an access token
    Login {
        email: String,
        #[arg(long, env = "NOTEBOOK_PASSWORD")]
        password: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let api = HttpNotebookApi::from_config(&cfg)?;
    info!(base_url = %api.base_url(), "using notebook backend");
    let store = Arc::new(NotebookStore::new(api));

    match args.command {
        Command::Notebooks => {
            store.fetch_notebooks().await?;
            for nb in store.notebooks() {
                println!(
                    "{}\t{}\t{} pages\t{}",
                    nb.id,
                    nb.title,
                    nb.pages_count,
                    nb.updated_at.format("%Y-%m-%d %H:%M")
                );
            }
        }
        Command::Show { id } => {
            let Some(nb) = store.fetch_notebook_by_id(&id).await? else {
                bail!("notebook {} not found", id);
            };
            println!("{}", nb.title);
            if let Some(description) = &nb.description {
                println!("{}", description);
            }
            println!(
                "{} pages, {} documents, {} flashcards",
                nb.pages_count, nb.documents_count, nb.flash_cards_count
            );
            for doc in nb.documents.iter().flatten() {
                let url = match (&doc.url, &doc.id) {
                    (Some(url), _) => Some(url.clone()),
                    (None, Some(doc_id)) => store.api().get_document_url(&id, doc_id).await?,
                    (None, None) => None,
                };
                println!(
                    "  [doc] {}\t{}",
                    doc.display_name().unwrap_or("unnamed document"),
                    url.as_deref().unwrap_or("-")
                );
            }
            if store.get_pages_by_notebook_id(&id).is_empty() {
                store.fetch_pages_for_notebook(&id).await?;
            }
            print_pages(&store, &id);
        }
        Command::Pages { id } => {
            store.fetch_pages_for_notebook(&id).await?;
            print_pages(&store, &id);
        }
        Command::Create { title, prompt } => {
            let data = NewNotebook {
                title,
                prompt,
                documents: Vec::new(),
            };
            let nb = store.create_notebook(&data).await?;
            println!("{}\t{}", nb.id, nb.title);
        }
        Command::Rename { id, title } => {
            let updates = NotebookUpdate {
                title: Some(title),
                description: None,
            };
            let nb = store.update_notebook(&id, &updates).await?;
            println!("{}\t{}", nb.id, nb.title);
        }
        Command::Describe { id, description } => {
            let updates = NotebookUpdate {
                title: None,
                description: Some(description),
            };
            store.update_notebook(&id, &updates).await?;
        }
        Command::Delete { id } => {
            store.delete_notebook(&id).await?;
        }
        Command::AddPage { id } => {
            let page = store.add_page_to_notebook(&id).await?;
            println!("{}\t{}", page.id, page.title);
        }
        Command::RenamePage {
            notebook,
            page,
            title,
        } => {
            let updated = store
                .update_page(&notebook, &page, &PageUpdate::title(title))
                .await?;
            println!("{}\t{}", updated.id, updated.title);
        }
        Command::SetContent { notebook, page } => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("failed to read page content from stdin")?;
            let content: serde_json::Value =
                serde_json::from_str(&input).context("page content must be JSON")?;
            let saver = Autosaver::spawn(store.clone(), notebook, page, cfg.autosave.debounce());
            saver.push(content);
            if let Some(saved) = saver.flush().await? {
                println!("saved {}", saved.id);
            }
            saver.shutdown().await;
        }
        Command::DeletePage { notebook, page } => {
            store.delete_page_from_notebook(&notebook, &page).await?;
        }
        Command::Stats { notebook, page } => {
            if store.get_page_by_id(&notebook, &page).await?.is_none() {
                bail!("page {} not found in notebook {}", page, notebook);
            }
            if let Some(stats) = store.page_stats(&notebook, &page) {
                println!("{} words, {}", stats.word_count, stats.reading_time);
            }
        }
        Command::Flashcards { notebook } => {
            let cards = match notebook {
                Some(id) => store.api().list_flashcards_for_notebook(&id).await?,
                None => store.api().list_flashcards().await?,
            };
            for card in cards {
                let accuracy = card
                    .accuracy()
                    .map(|a| format!("{:.0}%", a * 100.0))
                    .unwrap_or_else(|| "-".to_string());
                println!("{}\t{}\t{}\t{}", card.id, card.notebook_title, accuracy, card.question);
            }
        }
        Command::Answer { card, answer } => {
            let verdict = store.api().submit_flashcard_answer(&card, &answer).await?;
            if verdict.is_correct {
                println!("correct");
            } else {
                println!(
                    "incorrect, expected: {}",
                    verdict.correct_answer.as_deref().unwrap_or("-")
                );
            }
            if let Some(explanation) = verdict.explanation {
                println!("{}", explanation);
            }
        }
        Command::Whoami => {
            let user = store.api().current_user().await?;
            println!("{} <{}>", user.name, user.email);
        }
        Command::Chat {
            notebook,
            page,
            message,
        } => {
            let context = store
                .get_page_by_id(&notebook, &page)
                .await?
                .and_then(|p| p.content)
                .map(|c| notebook_sync::content::extract_text(&c))
                .filter(|t| !t.is_empty());
            let request = ChatRequest {
                message,
                context,
                ..Default::default()
            };
            let reply = store.api().chat_with_ai(&notebook, &page, &request).await?;
            println!("{}", reply.content);
        }
        Command::Login { email, password } => {
            let res = store
                .api()
                .login(&Credentials { email, password })
                .await?;
            println!("{}", res.access_token);
        }
    }

    Ok(())
}

fn print_pages(store: &NotebookStore<HttpNotebookApi>, notebook_id: &str) {
    for page in store.get_pages_by_notebook_id(notebook_id) {
        println!(
            "  {}\t{}\t{}",
            page.id,
            page.title,
            page.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
}
