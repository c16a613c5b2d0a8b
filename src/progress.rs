use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Spinner counting fetched pages for a walk whose length is unknown.
pub fn page_spinner(label: String) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}: {pos} pages")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message(label);
    spinner
}

/// Bar over a known number of pages.
pub fn page_bar(label: String, pages: u64) -> ProgressBar {
    let bar = ProgressBar::new(pages);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_message(label);
    bar
}

/// Per-worker bar registered with the shared `multi` display.
pub fn shard_bar(multi: &MultiProgress, shard: usize, posts: usize) -> ProgressBar {
    let bar = multi.add(ProgressBar::new(posts as u64));
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} shard {prefix} [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    bar.set_prefix(shard.to_string());
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use indicatif::ProgressDrawTarget;

    #[test]
    fn shard_bars_track_their_posts() {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::hidden());
        let bar = shard_bar(&multi, 2, 5);
        assert_eq!(bar.length(), Some(5));
        assert_eq!(bar.prefix(), "2");
        bar.inc(5);
        assert_eq!(bar.position(), 5);
    }

    #[test]
    fn page_bar_is_sized_by_page_cap() {
        let bar = page_bar("flickr corgi".to_string(), 3);
        assert_eq!(bar.length(), Some(3));
        assert_eq!(bar.message(), "flickr corgi");
        let spinner = page_spinner("danbooru all".to_string());
        assert_eq!(spinner.length(), None);
    }
}
