use papersio_session::{ResearchResponse, Session, Source};

const BAR_WIDTH: usize = 24;

/// Tracks what has already been printed so repeated snapshots stay quiet.
#[derive(Debug, Default)]
pub struct ProgressPrinter {
    last_stage: String,
    last_progress: u8,
}

impl ProgressPrinter {
    /// Returns the line to print for `session`, if anything changed.
    pub fn line_for(&mut self, session: &Session) -> Option<String> {
        if session.current_stage.is_empty() {
            return None;
        }
        if session.current_stage == self.last_stage
            && session.displayed_progress == self.last_progress
        {
            return None;
        }
        self.last_stage = session.current_stage.clone();
        self.last_progress = session.displayed_progress;

        let mut line = format!(
            "{} {:>3}%  {}",
            progress_bar(session.displayed_progress),
            session.displayed_progress,
            session.current_stage
        );
        if !session.stage_details.is_empty() {
            line.push_str(" - ");
            line.push_str(&session.stage_details);
        }
        Some(line)
    }
}

pub fn progress_bar(percent: u8) -> String {
    let percent = percent.min(100) as usize;
    let filled = (percent * BAR_WIDTH + 50) / 100;
    format!("[{}{}]", "#".repeat(filled), "-".repeat(BAR_WIDTH - filled))
}

pub fn report(response: &ResearchResponse) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n", response.query()));
    out.push_str(response.answer().trim_end());
    out.push_str("\n\n");

    let academic: Vec<&Source> = response.academic_sources().collect();
    let web: Vec<&Source> = response.web_sources().collect();
    if !academic.is_empty() {
        out.push_str("## Academic sources\n");
        push_sources(&mut out, &academic);
    }
    if !web.is_empty() {
        out.push_str("## Web sources\n");
        push_sources(&mut out, &web);
    }
    out.push_str(&format!("\n_{}_\n", response.strategy_label()));
    out
}

fn push_sources(out: &mut String, sources: &[&Source]) {
    for (i, source) in sources.iter().enumerate() {
        out.push_str(&format!("{}. {} <{}>", i + 1, source.title, source.url));
        if !source.authors.is_empty() {
            out.push_str(&format!(" ({})", source.authors.join(", ")));
        }
        out.push('\n');
    }
    out.push('\n');
}
