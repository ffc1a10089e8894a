use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Query a running catalog gateway", long_about = None)]
struct Cli {
    /// Gateway base URL.
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    /// Route prefix template; `{backend}` is replaced by the backend name.
    #[arg(short, long, default_value = "/api/v1/{backend}")]
    prefix: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe one or more backends through the gateway
    Health {
        #[arg(required = true)]
        backends: Vec<String>,
    },
    /// Fetch an image through a backend's image route and report what came back
    Image {
        /// Backend whose image route is used
        #[arg(short, long, default_value = "anime")]
        backend: String,
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::builder().no_proxy().build()?;
    let base = cli.url.trim_end_matches('/');

    match &cli.command {
        Commands::Health { backends } => {
            for backend in backends {
                let prefix = cli.prefix.replace("{backend}", backend);
                let res = client.get(format!("{base}{prefix}/health")).send().await?;
                println!("{backend}:");
                print_response(res).await?;
            }
        }
        Commands::Image { backend, url } => {
            let prefix = cli.prefix.replace("{backend}", backend);
            let res = client
                .get(format!("{base}{prefix}/image"))
                .query(&[("url", url)])
                .send()
                .await?;

            let status = res.status();
            if !status.is_success() {
                print_response(res).await?;
                return Ok(());
            }
            let content_type = header_text(&res, reqwest::header::CONTENT_TYPE);
            let cache_control = header_text(&res, reqwest::header::CACHE_CONTROL);
            let bytes = res.bytes().await?;
            println!("status:        {status}");
            println!("content-type:  {content_type}");
            println!("cache-control: {cache_control}");
            println!("bytes:         {}", bytes.len());
        }
    }

    Ok(())
}

fn header_text(res: &reqwest::Response, name: reqwest::header::HeaderName) -> String {
    res.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
        .to_string()
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
    }

    let text = res.text().await?;
    match serde_json::from_str::<Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) => println!("{}", text),
    }
    Ok(())
}
