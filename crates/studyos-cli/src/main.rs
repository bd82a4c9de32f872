use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "studyos", version, about = "StudyOS CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Study timer control
    Timer {
        #[command(subcommand)]
        action: commands::timer::TimerAction,
    },
    /// Task management and placement
    Task {
        #[command(subcommand)]
        action: commands::task::TaskAction,
    },
    /// Day timelines and the optimizer
    Timeline {
        #[command(subcommand)]
        action: commands::timeline::TimelineAction,
    },
    /// Subjects, chapters, and spaced revisions
    Study {
        #[command(subcommand)]
        action: commands::study::StudyAction,
    },
    /// Wellbeing score and breaks
    Wellbeing {
        #[command(subcommand)]
        action: commands::wellbeing::WellbeingAction,
    },
    /// Notifications and preferences
    Notify {
        #[command(subcommand)]
        action: commands::notify::NotifyAction,
    },
    /// Achievements and streak
    Achievements {
        #[command(subcommand)]
        action: commands::achievements::AchievementsAction,
    },
    /// Run the background loops until interrupted
    Serve,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("studyos=info")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Timer { action } => commands::timer::run(action),
        Commands::Task { action } => commands::task::run(action),
        Commands::Timeline { action } => commands::timeline::run(action),
        Commands::Study { action } => commands::study::run(action),
        Commands::Wellbeing { action } => commands::wellbeing::run(action),
        Commands::Notify { action } => commands::notify::run(action),
        Commands::Achievements { action } => commands::achievements::run(action),
        Commands::Serve => commands::serve::run(),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
