mod cli;

use clap::Parser;
use docent_core::bootstrap::{health_check, resolve_config_path};
use docent_core::AppBuilder;
use docent_gateway::{AppState, GatewayServer};
use tokio::sync::watch;

use crate::cli::{Cli, Command, ServeArgs, UserCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_subscriber();

    let config_path = resolve_config_path(cli.config.as_deref());
    let builder = AppBuilder::load(&config_path).await?;

    match cli.command {
        None => serve(builder, ServeArgs::default()).await,
        Some(Command::Serve(args)) => serve(builder, args).await,
        Some(Command::User { command }) => run_user_command(&builder, command).await,
    }
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn serve(builder: AppBuilder, args: ServeArgs) -> anyhow::Result<()> {
    let provider = builder.build_provider()?;
    health_check(&provider).await;

    let app = builder.build_with_provider(provider).await?;
    let host = args.host.unwrap_or_else(|| app.config.server.host.clone());
    let port = args.port.unwrap_or(app.config.server.port);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e:#}");
            return;
        }
        tracing::info!("received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    GatewayServer::new(&host, port, AppState::from(&app), shutdown_rx)
        .with_rate_limit(app.config.server.rate_limit)
        .with_max_body_size(app.config.server.max_body_size)
        .serve()
        .await?;
    Ok(())
}

async fn run_user_command(builder: &AppBuilder, command: UserCommand) -> anyhow::Result<()> {
    let store = builder.build_store().await?;
    match command {
        UserCommand::Create {
            email,
            username,
            staff,
        } => {
            let (user, token) = store.create_user(&email, &username, staff).await?;
            tracing::info!(user_id = user.id, staff, "user created");
            println!("created user {} <{}> (id {})", user.username, user.email, user.id);
            println!("API token (shown only once): {token}");
        }
        UserCommand::List => {
            for user in store.list_users().await? {
                println!(
                    "{:>4}  {:<32} {:<20} staff={} active={} joined={}",
                    user.id,
                    user.email,
                    user.username,
                    user.is_staff,
                    user.is_active,
                    user.date_joined.format("%Y-%m-%d")
                );
            }
        }
        UserCommand::Enable { id } => {
            store.set_user_active(id, true).await?;
            println!("user {id} enabled");
        }
        UserCommand::Disable { id } => {
            store.set_user_active(id, false).await?;
            println!("user {id} disabled");
        }
    }
    Ok(())
}
