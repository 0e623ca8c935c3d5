//! git-remote-rclone binary entry point.

fn main() {
    if let Err(err) = git_remote_rclone::cli::run() {
        git_remote_rclone::ui::output::error(format!("{err:#}"));
        std::process::exit(1);
    }
}
