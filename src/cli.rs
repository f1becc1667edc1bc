use anyhow::{bail, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use env_logger::{Builder, WriteStyle};
use futures_util::future::join_all;
use log::LevelFilter;
use prophecy::api::*;
use prophecy::client::HttpRemote;
use prophecy::settings::{Settings, DEFAULT_CONFIG_FILE};
use prophecy::store::{PredictionStore, RemoteSync};
use rust_decimal::Decimal;

#[derive(Parser)]
struct Args {
    #[command(subcommand)]
    command: Commands,
    /// Settings file, without the .toml extension
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: String,
    /// Overrides the configured remote url
    #[arg(short, long)]
    url: Option<String>,
    #[arg(long)]
    api_key: Option<String>,
    /// Acts as this user, votes are only recorded when set
    #[arg(long, requires = "username")]
    user_id: Option<String>,
    #[arg(long)]
    username: Option<String>,
    #[arg(short, long)]
    verbose: bool,
}
#[derive(Subcommand)]
enum Commands {
    List {
        /// Pages to load after the first one
        #[arg(short, long, default_value_t = 0)]
        more: usize,
    },
    Create {
        #[arg(short, long)]
        title: String,
        #[arg(short, long, required = true)]
        option: Vec<String>,
        #[arg(short, long, default_value = "24h")]
        duration: DurationPreset,
        #[arg(short, long, default_value = "0")]
        seed: Decimal,
        #[arg(long)]
        thumbnail: Option<String>,
    },
    Vote {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long)]
        option: OptionId,
        #[arg(short, long)]
        amount: Decimal,
    },
    Comment {
        #[arg(short, long)]
        prediction: PredictionId,
        #[arg(short, long)]
        text: String,
    },
    Votes {
        #[arg(short, long)]
        prediction: PredictionId,
    },
    Leaderboard {
        #[arg(short, long)]
        limit: Option<usize>,
    },
}

fn signed_in_user(cli: &Args) -> Option<User> {
    match (&cli.user_id, &cli.username) {
        (Some(id), Some(username)) => Some(User {
            id: id.clone(),
            username: username.clone(),
            twitter: format!("@{}", username),
            avatar: String::new(),
            stats: UserStats::default(),
        }),
        _ => None,
    }
}

/// Pages through the remote until `id` is loaded or there is nothing left.
async fn find(store: &PredictionStore, id: &str) -> Result<Prediction> {
    store.load().await;
    loop {
        if let Some(prediction) = store.prediction(id) {
            return Ok(prediction);
        }
        let before = store.snapshot();
        if !before.has_more {
            break;
        }
        store.load_more().await;
        if store.snapshot().offset == before.offset {
            break;
        }
    }
    bail!("Prediction {} not found", id)
}

async fn report(syncs: Vec<RemoteSync>) {
    let results = join_all(syncs.into_iter().map(|sync| sync.settled())).await;
    if results.iter().all(|synced| *synced) {
        println!("Saved to remote");
    } else {
        println!("Kept locally, couldn't sync with remote");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Args::parse();
    Builder::default()
        .filter_level(if cli.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .write_style(WriteStyle::Always)
        .init();

    let mut settings = Settings::load(&cli.config)?;
    if cli.url.is_some() {
        settings.remote_url = cli.url.clone();
    }
    if cli.api_key.is_some() {
        settings.api_key = cli.api_key.clone();
    }
    let store = PredictionStore::new(settings.remote()?, settings.page_size);
    let mut syncs = vec![];
    if let Some(user) = signed_in_user(&cli) {
        syncs.push(store.sign_in(user));
    }

    match cli.command {
        Commands::List { more } => {
            store.load().await;
            for _ in 0..more {
                store.load_more().await;
            }
            let snapshot = store.snapshot();
            let now = Utc::now();
            for prediction in &snapshot.predictions {
                let remaining = prediction.time_remaining(now);
                println!(
                    "{}\n    closes in {}h {}m",
                    prediction,
                    remaining.num_hours(),
                    remaining.num_minutes() % 60
                );
            }
            if snapshot.has_more {
                println!("More predictions available past {}", snapshot.offset);
            }
        }
        Commands::Create {
            title,
            option,
            duration,
            seed,
            thumbnail,
        } => {
            let draft = NewPrediction {
                title,
                thumbnail,
                options: option.into_iter().map(NewOption::new).collect(),
                duration,
                seed,
                author: store.user().as_ref().map(Author::from),
            };
            let prediction = draft.build()?;
            println!("Created prediction {}", prediction);
            syncs.push(store.create(prediction));
        }
        Commands::Vote {
            prediction,
            option,
            amount,
        } => {
            find(&store, &prediction).await?;
            if let Some(sync) = store.vote(&prediction, &option, amount)? {
                syncs.push(sync);
            }
            if let Some(updated) = store.prediction(&prediction) {
                println!("{}", updated);
            }
        }
        Commands::Comment { prediction, text } => {
            find(&store, &prediction).await?;
            let author = store
                .user()
                .as_ref()
                .map(CommentAuthor::from)
                .unwrap_or_else(|| CommentAuthor::from(&Author::anonymous()));
            let comment = Comment::new(author, &text)?;
            if let Some(sync) = store.comment(&prediction, comment)? {
                syncs.push(sync);
            }
        }
        Commands::Votes { prediction } => {
            let url = match &settings.remote_url {
                Some(url) if settings.is_configured() => url.clone(),
                _ => bail!("No remote url configured"),
            };
            let remote = HttpRemote::new(url, settings.api_key.clone());
            for vote in remote.fetch_votes(&prediction).await? {
                println!(
                    "{} voted {} on option #{}",
                    vote.user_id, vote.amount, vote.option_selected
                );
            }
        }
        Commands::Leaderboard { limit } => {
            store
                .load_leaderboard(limit.unwrap_or(settings.leaderboard_size))
                .await;
            for (rank, entry) in store.leaderboard().iter().enumerate() {
                println!("{:>3}. {} {}", rank + 1, entry.username, entry.score);
            }
        }
    }

    if !syncs.is_empty() {
        report(syncs).await;
    }
    Ok(())
}
