use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use folio_rest_api::api::{self, AppState};
use folio_rest_api::auth::{AuthProvider, AuthService, RemoteAuth, Session, User};
use folio_rest_api::client::{self, ApiAuth, NoteFilter};
use folio_rest_api::config::ServerConfig;
use folio_rest_api::hierarchy::{build_tree, DeleteMode};
use folio_rest_api::storage::LocalStorage;
use folio_rest_api::store::{DataStore, MemoryStore, PgStore};
use folio_rest_api::tables::{
    CategoryChanges, Folder, FolderChanges, NewCategory, NewFolder, NewNote, NoteChanges,
    RecordId, DEFAULT_FOLDER_COLOR,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// The address to bind to; overrides BIND_ADDR
        #[arg(short, long)]
        addr: Option<SocketAddr>,
        /// Keep records in process instead of Postgres
        #[arg(long)]
        in_memory: bool,
    },
    /// Print the folder tree of a JSON folder list without a server
    Tree {
        /// JSON array of folders (id, name, parent_folder_id, sort_order)
        file: PathBuf,
        /// Print one "A > B > C" path per folder instead of an outline
        #[arg(long)]
        paths: bool,
    },
    /// Client commands
    Client {
        /// The base URL of the API
        #[arg(long, default_value = folio_rest_api::BASE_URL)]
        url: String,
        #[command(flatten)]
        admin: AdminArgs,
        #[command(subcommand)]
        command: ClientCommands,
    },
}

/// Credentials for admin commands: a token, or an email/password pair.
#[derive(Args)]
struct AdminArgs {
    #[arg(long, env = "FOLIO_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,
    #[arg(long, env = "FOLIO_EMAIL", global = true)]
    email: Option<String>,
    #[arg(long, env = "FOLIO_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Sign in and print the session token
    SignIn,
    /// Category commands
    Categories {
        #[command(subcommand)]
        command: CategoryCommands,
    },
    /// Folder commands
    Folders {
        #[command(subcommand)]
        command: FolderCommands,
    },
    /// Note commands
    Notes {
        #[command(subcommand)]
        command: NoteCommands,
    },
    /// Upload files and print their embed snippets
    Upload {
        files: Vec<PathBuf>,
        /// Storage folder on the server
        #[arg(long)]
        folder: Option<String>,
    },
    /// Save an uploaded file locally
    Download {
        /// Storage path, e.g. general/1700000000000-abc.png
        path: String,
        /// Defaults to the file name in the current directory
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Delete an uploaded file by its storage path
    DeleteUpload { path: String },
}

#[derive(Subcommand)]
enum CategoryCommands {
    List,
    Get { id: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Update {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        color: Option<String>,
    },
    Delete { id: String },
}

#[derive(Subcommand)]
enum FolderCommands {
    List,
    /// Display the folder tree
    Tree {
        /// Only this category's folders
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        paths: bool,
    },
    Get { id: String },
    Descendants { id: String },
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        category: String,
        #[arg(long)]
        parent: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        sort_order: Option<i32>,
    },
    Rename {
        id: String,
        #[arg(long)]
        name: String,
    },
    /// Move a folder under another one, or to the top level without --parent
    Move {
        id: String,
        #[arg(long)]
        parent: Option<String>,
        /// Move to another category as well
        #[arg(long)]
        category: Option<String>,
    },
    /// Folders a folder may be moved under
    Parents {
        id: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Show what deleting a folder would involve
    DeletePrompt { id: String },
    /// Delete a folder; folders with content need --mode cascade|detach
    Delete {
        id: String,
        #[arg(long)]
        mode: Option<DeleteMode>,
    },
}

#[derive(Subcommand)]
enum NoteCommands {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        /// Search title and content
        #[arg(long)]
        q: Option<String>,
        /// Only fetch metadata (exclude content)
        #[arg(long)]
        metadata_only: bool,
        /// Include archived notes (admin)
        #[arg(long)]
        all: bool,
    },
    Get { id: String },
    /// Print the rendered HTML of a note
    Html { id: String },
    /// List uploaded files a note links to
    Attachments { id: String },
    /// Save a note as a Markdown document
    Export {
        id: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
    },
    /// Clone all published notes to a local directory
    Clone { dir: PathBuf },
    Create {
        #[arg(long)]
        title: String,
        /// Markdown file with the note body
        #[arg(long)]
        content_file: Option<PathBuf>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        folder: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Move a note into a folder, or out of any folder without --folder
    Move {
        id: String,
        #[arg(long)]
        folder: Option<String>,
    },
    Archive {
        id: String,
        /// Publish the note again
        #[arg(long)]
        undo: bool,
    },
    Delete { id: String },
}

/// Entry of the offline `tree` input; only id and name are required.
#[derive(Deserialize)]
struct TreeFolder {
    id: RecordId,
    name: String,
    #[serde(default)]
    parent_folder_id: Option<RecordId>,
    #[serde(default)]
    sort_order: i32,
    #[serde(default)]
    category_id: RecordId,
}

impl From<TreeFolder> for Folder {
    fn from(f: TreeFolder) -> Self {
        Folder {
            id: f.id,
            name: f.name,
            description: None,
            color: DEFAULT_FOLDER_COLOR.to_string(),
            category_id: f.category_id,
            parent_folder_id: f.parent_folder_id,
            sort_order: f.sort_order,
            created_at: Utc::now(),
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("folio_rest_api=info,tower_http=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { addr, in_memory } => serve(addr, in_memory).await,
        Commands::Tree { file, paths } => print_tree_file(&file, paths),
        Commands::Client {
            url,
            admin,
            command,
        } => run_client(&url, &admin, command).await,
    }
}

// * Server ...................................................................

async fn serve(addr: Option<SocketAddr>, in_memory: bool) -> anyhow::Result<()> {
    let mut config = ServerConfig::from_env().context("Invalid server configuration")?;
    if let Some(addr) = addr {
        config.bind_addr = addr;
    }

    let storage = LocalStorage::new(&config.upload_dir, &config.public_base_url);
    let auth = RemoteAuth::new(&config.auth);

    if in_memory {
        info!("Using the in-memory store; records are lost on exit");
        run_server(MemoryStore::new(), auth, storage, &config).await
    } else {
        let store = PgStore::connect(config.database_url()?)?;
        run_server(store, auth, storage, &config).await
    }
}

async fn run_server<S: DataStore, A: AuthProvider>(
    store: S,
    auth: A,
    storage: LocalStorage,
    config: &ServerConfig,
) -> anyhow::Result<()> {
    let state = AppState::new(store, auth, storage, config.max_upload_bytes);
    let mut app = api::create_router(state);
    if let Some(cors) = api::cors_layer(&config.cors_origins) {
        app = app.layer(cors);
    }

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, uploads = %config.upload_dir.display(), "Server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// * Offline tree .............................................................

fn print_tree_file(file: &Path, paths: bool) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Error reading file {}", file.display()))?;
    let entries: Vec<TreeFolder> =
        serde_json::from_str(&content).context("Expected a JSON array of folders")?;
    let folders: Vec<Folder> = entries.into_iter().map(Folder::from).collect();

    let tree = build_tree(&folders);
    if paths {
        print!("{}", client::format_paths(&tree));
    } else {
        print!("{}", client::format_tree(&tree));
    }
    Ok(())
}

// * Client ...................................................................

/// Token for admin commands, validated against the server.
async fn admin_token(url: &str, admin: &AdminArgs) -> anyhow::Result<String> {
    let auth = AuthService::new(ApiAuth::new(url));
    auth.subscribe(|state| debug!(authenticated = state.is_authenticated, "Auth state changed"));

    if let Some(token) = &admin.token {
        let state = auth
            .restore(Some(Session {
                access_token: token.clone(),
                refresh_token: None,
                expires_in: None,
                user: User {
                    id: String::new(),
                    email: None,
                },
            }))
            .await;
        if !state.is_authenticated {
            bail!("The given token was rejected; sign in again");
        }
    } else if let (Some(email), Some(password)) = (&admin.email, &admin.password) {
        auth.sign_in(email, password).await?;
    } else {
        bail!("Admin commands need --token or --email and --password");
    }

    auth.access_token()
        .context("Auth service did not keep the session")
}

async fn run_client(url: &str, admin: &AdminArgs, command: ClientCommands) -> anyhow::Result<()> {
    match command {
        ClientCommands::SignIn => {
            let token = admin_token(url, admin).await?;
            println!("{}", token);
        }
        ClientCommands::Categories { command } => categories(url, admin, command).await?,
        ClientCommands::Folders { command } => folders(url, admin, command).await?,
        ClientCommands::Notes { command } => notes(url, admin, command).await?,
        ClientCommands::Upload { files, folder } => {
            if files.is_empty() {
                bail!("No files given");
            }
            let token = admin_token(url, admin).await?;
            let paths: Vec<&Path> = files.iter().map(PathBuf::as_path).collect();
            let uploaded = client::upload_files(url, &token, &paths, folder.as_deref()).await?;
            for file in uploaded {
                println!("{}\t{}", file.file.path, file.snippet);
            }
        }
        ClientCommands::Download { path, output } => {
            let output = match output {
                Some(output) => output,
                None => PathBuf::from(
                    Path::new(&path)
                        .file_name()
                        .context("Storage path has no file name")?,
                ),
            };
            client::download_file(url, &path, &output).await?;
            println!("Saved {} to {}", path, output.display());
        }
        ClientCommands::DeleteUpload { path } => {
            let token = admin_token(url, admin).await?;
            print_json(&client::delete_file(url, &token, &path).await?)?;
        }
    }
    Ok(())
}

async fn categories(url: &str, admin: &AdminArgs, command: CategoryCommands) -> anyhow::Result<()> {
    match command {
        CategoryCommands::List => print_json(&client::fetch_categories(url).await?),
        CategoryCommands::Get { id } => print_json(&client::fetch_category(url, &id).await?),
        CategoryCommands::Create {
            name,
            description,
            color,
        } => {
            let token = admin_token(url, admin).await?;
            let category = NewCategory {
                name,
                description,
                color,
            };
            print_json(&client::create_category(url, &token, &category).await?)
        }
        CategoryCommands::Update {
            id,
            name,
            description,
            color,
        } => {
            let token = admin_token(url, admin).await?;
            let changes = CategoryChanges {
                name,
                description,
                color,
            };
            print_json(&client::update_category(url, &token, &id, &changes).await?)
        }
        CategoryCommands::Delete { id } => {
            let token = admin_token(url, admin).await?;
            let deleted = client::delete_category(url, &token, &id).await?;
            println!("{}", deleted.message);
            Ok(())
        }
    }
}

async fn folders(url: &str, admin: &AdminArgs, command: FolderCommands) -> anyhow::Result<()> {
    match command {
        FolderCommands::List => print_json(&client::fetch_folders(url).await?),
        FolderCommands::Tree { category, paths } => {
            let tree = client::fetch_folder_tree(url, category.as_deref()).await?;
            if paths {
                print!("{}", client::format_paths(&tree));
            } else {
                print!("{}", client::format_tree(&tree));
            }
            Ok(())
        }
        FolderCommands::Get { id } => print_json(&client::fetch_folder(url, &id).await?),
        FolderCommands::Descendants { id } => {
            print_json(&client::fetch_descendants(url, &id).await?)
        }
        FolderCommands::Create {
            name,
            category,
            parent,
            description,
            sort_order,
        } => {
            let token = admin_token(url, admin).await?;
            let folder = NewFolder {
                name,
                description,
                category_id: category,
                color: None,
                parent_folder_id: parent,
                sort_order,
            };
            print_json(&client::create_folder(url, &token, &folder).await?)
        }
        FolderCommands::Rename { id, name } => {
            let token = admin_token(url, admin).await?;
            let changes = FolderChanges {
                name: Some(name),
                ..FolderChanges::default()
            };
            print_json(&client::update_folder(url, &token, &id, &changes).await?)
        }
        FolderCommands::Move {
            id,
            parent,
            category,
        } => {
            let token = admin_token(url, admin).await?;
            let folder = match category {
                Some(category) => {
                    let changes = FolderChanges {
                        category_id: Some(category),
                        parent_folder_id: Some(parent),
                        ..FolderChanges::default()
                    };
                    client::update_folder(url, &token, &id, &changes).await?
                }
                None => client::move_folder(url, &token, &id, parent.as_deref()).await?,
            };
            print_json(&folder)
        }
        FolderCommands::Parents { id, category } => {
            let token = admin_token(url, admin).await?;
            let parents =
                client::fetch_available_parents(url, &token, &id, category.as_deref()).await?;
            print_json(&parents)
        }
        FolderCommands::DeletePrompt { id } => {
            let token = admin_token(url, admin).await?;
            print_json(&client::fetch_deletion_prompt(url, &token, &id).await?)
        }
        FolderCommands::Delete { id, mode } => {
            let token = admin_token(url, admin).await?;
            let report = client::delete_folder(url, &token, &id, mode).await?;
            info!(
                folder_id = %report.folder_id,
                mode = %report.mode,
                subfolders = report.deleted_subfolders.len(),
                detached = report.detached_children.len(),
                notes = report.deleted_notes,
                "Folder deleted"
            );
            print_json(&report)
        }
    }
}

async fn notes(url: &str, admin: &AdminArgs, command: NoteCommands) -> anyhow::Result<()> {
    match command {
        NoteCommands::List {
            category,
            folder,
            q,
            metadata_only,
            all,
        } => {
            let filter = NoteFilter {
                category_id: category,
                folder_id: folder,
                q,
            };
            if all {
                let token = admin_token(url, admin).await?;
                print_json(&client::fetch_all_notes(url, &token, &filter).await?)
            } else if metadata_only {
                print_json(&client::fetch_note_summaries(url, &filter).await?)
            } else {
                print_json(&client::fetch_notes(url, &filter).await?)
            }
        }
        NoteCommands::Get { id } => print_json(&client::fetch_note(url, &id).await?),
        NoteCommands::Html { id } => {
            let rendered = client::fetch_note_html(url, &id).await?;
            println!("{}", rendered.html);
            Ok(())
        }
        NoteCommands::Attachments { id } => {
            for attachment in client::fetch_attachments(url, &id).await? {
                println!("{}", attachment);
            }
            Ok(())
        }
        NoteCommands::Export { id, dir } => {
            let path = client::export_note(url, &id, &dir).await?;
            println!("Exported note to {}", path.display());
            Ok(())
        }
        NoteCommands::Clone { dir } => {
            let files = client::clone_notes(url, &dir).await?;
            println!("Cloned {} notes to {}", files.len(), dir.display());
            Ok(())
        }
        NoteCommands::Create {
            title,
            content_file,
            category,
            folder,
            tags,
        } => {
            let content = match content_file {
                Some(path) => tokio::fs::read_to_string(&path)
                    .await
                    .with_context(|| format!("Error reading {}", path.display()))?,
                None => String::new(),
            };
            let token = admin_token(url, admin).await?;
            let note = NewNote {
                title,
                content,
                category_id: category,
                folder_id: folder,
                tags,
                is_archived: false,
            };
            print_json(&client::create_note(url, &token, &note).await?)
        }
        NoteCommands::Move { id, folder } => {
            let token = admin_token(url, admin).await?;
            let changes = NoteChanges {
                folder_id: Some(folder),
                ..NoteChanges::default()
            };
            print_json(&client::update_note(url, &token, &id, &changes).await?)
        }
        NoteCommands::Archive { id, undo } => {
            let token = admin_token(url, admin).await?;
            let changes = NoteChanges {
                is_archived: Some(!undo),
                ..NoteChanges::default()
            };
            print_json(&client::update_note(url, &token, &id, &changes).await?)
        }
        NoteCommands::Delete { id } => {
            let token = admin_token(url, admin).await?;
            let deleted = client::delete_note(url, &token, &id).await?;
            println!("{}", deleted.message);
            Ok(())
        }
    }
}
