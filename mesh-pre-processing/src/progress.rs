/// Progress bars for long streaming passes
use indicatif::{ProgressBar, ProgressStyle};

/// Bar counting processed chunks. Hidden when `visible` is false.
pub fn chunk_bar(len: u64, message: &'static str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("[{bar:40.green/blue}] {pos}/{len} chunks ({percent}%) {msg}")
    {
        pb.set_style(style.progress_chars("▉▊▋▌▍▎▏ "));
    }
    pb.set_message(message);
    pb
}
