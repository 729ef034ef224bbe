use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "apiserver-cli")]
#[command(about = "Management CLI for the user API server", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Bearer token for authenticated commands.
    #[arg(short, long, env = "APISERVER_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Exchange a username and password for a token
    Login {
        username: String,
        #[arg(short, long, env = "APISERVER_PASSWORD")]
        password: String,
    },
    /// Reissue the current token before the refresh window closes
    Refresh,
    /// Show one user
    User { name: String },
    /// List users
    Users {
        #[arg(long)]
        offset: Option<u64>,
        #[arg(long)]
        limit: Option<u64>,
    },
    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    if let Some(token) = &cli.token {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }

    let res = match cli.command {
        Commands::Login { username, password } => {
            client
                .post(format!("{}/login", cli.url))
                .basic_auth(username, Some(password))
                .send()
                .await?
        }
        Commands::Refresh => {
            client
                .post(format!("{}/refresh_token", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::User { name } => {
            client
                .get(format!("{}/v1/users/{name}", cli.url))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Users { offset, limit } => {
            let mut query = Vec::new();
            if let Some(offset) = offset {
                query.push(("offset", offset));
            }
            if let Some(limit) = limit {
                query.push(("limit", limit));
            }
            client
                .get(format!("{}/v1/users", cli.url))
                .query(&query)
                .headers(headers)
                .send()
                .await?
        }
        Commands::Health => client.get(format!("{}/healthz", cli.url)).send().await?,
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
