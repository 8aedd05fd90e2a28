use treehole::app::RunOptions;

fn main() {
    let options = match handle_cli_flags() {
        Ok(Some(options)) => options,
        Ok(None) => return,
        Err(message) => {
            eprintln!("error: {message}");
            std::process::exit(2);
        }
    };

    if let Err(err) = treehole::run(options) {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

/// `Ok(None)` means an informational flag was handled and we should exit.
fn handle_cli_flags() -> Result<Option<RunOptions>, String> {
    let mut options = RunOptions::default();
    let mut saw_info_flag = false;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("treehole {}", treehole::VERSION);
                saw_info_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "treehole: Browse and post to an anonymous message board from the terminal.\n\n  --version, -V        Show version and exit\n  --help,    -h        Show this help message\n  --offline            Use an in-memory demo board\n  --base-url <url>     API base URL (default {})",
                    treehole::api::DEFAULT_BASE_URL
                );
                saw_info_flag = true;
            }
            "--offline" => options.offline = true,
            "--base-url" => match args.next() {
                Some(url) => options.base_url = Some(url),
                None => return Err("--base-url requires a value".into()),
            },
            other => {
                if let Some(url) = other.strip_prefix("--base-url=") {
                    options.base_url = Some(url.to_string());
                } else {
                    return Err(format!("unknown argument: {other}"));
                }
            }
        }
    }
    Ok((!saw_info_flag).then_some(options))
}
