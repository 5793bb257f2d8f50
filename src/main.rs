use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use hafal::review::CategorySummary;
use hafal::scheduler::{self, Difficulty};
use hafal::streak::{self, Progress};
use hafal::vocab::{self, Library, Vocabulary};
use hafal::{Error, review};
use rand::seq::SliceRandom;
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_PROGRESS_FILE: &str = "progress.json";

struct Options {
    paths: Vec<String>,
    port: u16,
    progress: PathBuf,
}

fn usage() -> ! {
    eprintln!("Usage: hafal <command> [args...]");
    eprintln!("Commands:");
    eprintln!("  drill <paths...> [-s PROGRESS]            Review due words in the terminal");
    eprintln!("  quiz <paths...> [-s PROGRESS]             Multiple-choice meaning quiz");
    eprintln!("  stats <paths...> [-s PROGRESS]            Show review statistics");
    eprintln!("  add <deck.csv> <hanzi> <pinyin> <meaning> [HSK] [CATEGORY]");
    eprintln!("                                            Add one word to a deck file");
    eprintln!("  delete <paths...> <id>                    Remove a word by id");
    eprintln!("  import <in.json|in.csv> <deck.csv>        Add words to a deck file");
    eprintln!("  export <paths...> <out.json|out.csv>      Export all words");
    eprintln!("  serve <paths...> [-p PORT] [-s PROGRESS]  Start the JSON API (default port 3000)");
    std::process::exit(1);
}

/// `RUST_LOG` when it parses, else `info`.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

fn main() {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .with_writer(io::stderr)
        .with_target(false)
        .with_ansi(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        usage();
    }
    let opts = parse_options(&args[2..]);

    let result = match args[1].as_str() {
        "drill" => drill(&opts),
        "quiz" => quiz(&opts),
        "stats" => stats(&opts),
        "add" => add(&opts.paths),
        "delete" => delete(&opts.paths),
        "import" => import(&opts.paths),
        "export" => export(&opts.paths),
        "serve" => match tokio::runtime::Runtime::new() {
            Ok(rt) => rt.block_on(hafal::web::serve(opts.paths, opts.port, opts.progress)),
            Err(e) => Err(Error::Server(e)),
        },
        other => {
            eprintln!("Unknown command: {other}");
            usage();
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn parse_options(args: &[String]) -> Options {
    let mut opts = Options {
        paths: Vec::new(),
        port: DEFAULT_PORT,
        progress: PathBuf::from(DEFAULT_PROGRESS_FILE),
    };
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-p" if i + 1 < args.len() => {
                opts.port = args[i + 1].parse().unwrap_or_else(|_| {
                    eprintln!("Invalid port: {}", args[i + 1]);
                    std::process::exit(1);
                });
                i += 2;
            }
            "-s" if i + 1 < args.len() => {
                opts.progress = PathBuf::from(&args[i + 1]);
                i += 2;
            }
            _ => {
                opts.paths.push(args[i].clone());
                i += 1;
            }
        }
    }
    opts
}

fn read_line(stdin: &mut impl BufRead, buf: &mut String) -> hafal::Result<()> {
    io::stdout().flush().map_err(|e| Error::io("<stdout>", e))?;
    buf.clear();
    stdin.read_line(buf).map_err(|e| Error::io("<stdin>", e))?;
    Ok(())
}

fn drill(opts: &Options) -> hafal::Result<()> {
    let mut library = Library::load(&opts.paths)?;
    if library.items.is_empty() {
        println!("No words found.");
        return Ok(());
    }
    let mut progress = Progress::load(&opts.progress)?;
    let catalogue = streak::default_achievements();

    let now = Local::now();
    let summaries: Vec<CategorySummary> = review::category_summaries(&library.items, &now)
        .into_iter()
        .filter(|s| s.due > 0)
        .collect();
    if summaries.is_empty() {
        println!("No words due for review.");
        return Ok(());
    }
    println!("Categories with words due:");
    for (i, s) in summaries.iter().enumerate() {
        println!("  {}: {} ({} due / {} total)", i + 1, s.name, s.due, s.total);
    }
    println!();

    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let mut buf = String::new();
    let selected = loop {
        print!("Categories (numbers or names, comma-separated; Enter for all): ");
        read_line(&mut stdin, &mut buf)?;
        if let Some(selected) = parse_category_selection(&buf, &summaries) {
            break selected;
        }
        println!("Unknown category. Try again.");
    };

    let due: Vec<usize> = review::filter_due(&library.items, &now)
        .into_iter()
        .filter(|&i| selected.is_empty() || selected.contains(&library.items[i].category))
        .collect();
    println!("{} words due for review.\n", due.len());

    let mut items = review::build_review_items(&library.items, &due);
    items.shuffle(&mut rand::thread_rng());

    let mut counts = [0u32; 4];
    for (i, item) in items.iter().enumerate() {
        println!("[{}/{}] {}", i + 1, items.len(), item.category);
        println!();
        println!("{}", item.prompt);
        println!();

        print!("Press Enter to reveal...");
        read_line(&mut stdin, &mut buf)?;
        println!("{}", item.answer);
        println!();

        let preview = scheduler::preview_intervals(&library.items[item.item_index].review_state());
        let difficulty = loop {
            print!(
                "Rate (1=again {}, 2=hard {}, 3=medium {}, 4=easy {}): ",
                scheduler::format_interval(preview[0]),
                scheduler::format_interval(preview[1]),
                scheduler::format_interval(preview[2]),
                scheduler::format_interval(preview[3]),
            );
            read_line(&mut stdin, &mut buf)?;
            if let Ok(n) = buf.trim().parse::<u8>()
                && let Some(d) = Difficulty::from_u8(n)
            {
                break d;
            }
            println!("Please enter 1, 2, 3, or 4.");
        };
        counts[difficulty as usize] += 1;

        let event = review::record_review(
            &mut library.items[item.item_index],
            difficulty,
            None,
            &Local::now(),
        );
        for a in progress.on_review(&event, &Local, &library.items, &catalogue) {
            println!("Achievement unlocked: {} ({})", a.name, a.description);
        }
        println!();
    }

    library.save_all()?;
    progress.save(&opts.progress)?;

    println!("Session complete!");
    println!(
        "  Again: {}, Hard: {}, Medium: {}, Easy: {}",
        counts[0], counts[1], counts[2], counts[3]
    );
    println!("  Streak: {} days", progress.streak.current);
    Ok(())
}

/// Blank, `0` or `all` selects every category (an empty list). Otherwise
/// each comma-separated part is a menu number or a category name; any part
/// that matches nothing rejects the whole input.
fn parse_category_selection(input: &str, summaries: &[CategorySummary]) -> Option<Vec<String>> {
    let input = input.trim();
    if input.is_empty() || input == "0" || input.eq_ignore_ascii_case("all") {
        return Some(Vec::new());
    }
    input
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            let found = match part.parse::<usize>() {
                Ok(n) => n.checked_sub(1).and_then(|i| summaries.get(i)),
                Err(_) => summaries.iter().find(|s| s.name.eq_ignore_ascii_case(part)),
            };
            found.map(|s| s.name.clone())
        })
        .collect()
}

fn quiz(opts: &Options) -> hafal::Result<()> {
    let mut library = Library::load(&opts.paths)?;
    let mut progress = Progress::load(&opts.progress)?;
    let catalogue = streak::default_achievements();
    let questions = review::build_quiz(&library.items, &mut rand::thread_rng())?;

    let stdin = io::stdin();
    let mut stdin = stdin.lock();
    let mut buf = String::new();
    let mut score = 0;
    for (n, question) in questions.iter().enumerate() {
        println!("[{}/{}] {}  {}", n + 1, questions.len(), question.prompt, question.pinyin);
        for (i, option) in question.options.iter().enumerate() {
            println!("  {}: {option}", i + 1);
        }

        let count = question.options.len();
        let choice = loop {
            print!("Meaning (1-{count}): ");
            read_line(&mut stdin, &mut buf)?;
            if let Ok(n) = buf.trim().parse::<usize>()
                && (1..=count).contains(&n)
            {
                break n - 1;
            }
            println!("Please enter a number from 1 to {count}.");
        };

        let (correct, event) = review::answer_quiz(
            &mut library.items[question.item_index],
            question,
            choice,
            &Local::now(),
        );
        if correct {
            score += 1;
            println!("Correct!");
        } else {
            println!("Wrong, it means: {}", question.options[question.answer]);
        }
        for a in progress.on_review(&event, &Local, &library.items, &catalogue) {
            println!("Achievement unlocked: {} ({})", a.name, a.description);
        }
        println!();
    }

    for a in progress.on_quiz_finished(score, questions.len(), &library.items, &catalogue) {
        println!("Achievement unlocked: {} ({})", a.name, a.description);
    }
    library.save_all()?;
    progress.save(&opts.progress)?;

    println!("Quiz complete! Score: {score}/{}", questions.len());
    Ok(())
}

fn stats(opts: &Options) -> hafal::Result<()> {
    let library = Library::load(&opts.paths)?;
    let progress = Progress::load(&opts.progress)?;
    let now = Local::now();
    let items = &library.items;

    let summary = review::summarize_reviews(items, &now);
    println!("Words:          {}", items.len());
    println!("Mastered:       {}%", review::mastery_percent(items));
    println!("Due now:        {}", summary.due_today);
    println!("Reviewed today: {}", summary.reviewed_today);
    println!("Total reviews:  {}", summary.total_reviews);
    println!(
        "Streak:         {} days (longest {})",
        progress.streak.current_on(now.date_naive()),
        progress.streak.longest
    );

    println!();
    println!("HSK progress:");
    for level in review::hsk_progress(items) {
        println!("  HSK {}: {}/{} mastered", level.level, level.mastered, level.total);
    }

    println!();
    println!("Categories:");
    for s in review::category_summaries(items, &now) {
        println!(
            "  {}: {} words, {} due, {} mastered",
            s.name, s.total, s.due, s.mastered
        );
    }
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn import(args: &[String]) -> hafal::Result<()> {
    let [input, deck] = args else {
        usage();
    };
    let input = Path::new(input);
    let deck = Path::new(deck);

    let incoming = if has_extension(input, "json") {
        let text = std::fs::read_to_string(input).map_err(|e| Error::io(input, e))?;
        vocab::import_json(&text)?
    } else {
        vocab::load_csv(input)?
    };

    let mut items = if deck.exists() {
        vocab::load_csv(deck)?
    } else {
        Vec::new()
    };
    let before = items.len();
    for item in incoming {
        if items.iter().any(|v| v.id == item.id) {
            tracing::warn!(id = %item.id, hanzi = %item.hanzi, "skipping duplicate id");
            continue;
        }
        items.push(item);
    }
    vocab::save_csv(deck, &items)?;

    println!("Imported {} words into {}.", items.len() - before, deck.display());
    Ok(())
}

fn add(args: &[String]) -> hafal::Result<()> {
    let [deck, hanzi, pinyin, meaning, rest @ ..] = args else {
        usage();
    };
    let level = rest.first().map_or(1, |l| vocab::normalize_hsk_level(l));
    let category = rest.get(1).map_or("", String::as_str);
    let item = Vocabulary::new(hanzi, pinyin, meaning, level, category);

    let deck = PathBuf::from(deck);
    let mut library = if deck.exists() {
        Library::load(&[deck.display().to_string()])?
    } else {
        Library::default()
    };
    let index = library.insert(item, deck.clone())?;
    println!("Added {} to {}.", library.items[index].hanzi, deck.display());
    Ok(())
}

fn delete(args: &[String]) -> hafal::Result<()> {
    let Some((id, paths)) = args.split_last() else {
        usage();
    };
    if paths.is_empty() {
        usage();
    }
    let mut library = Library::load(paths)?;
    let index = library
        .position(id)
        .ok_or_else(|| Error::UnknownItem(id.clone()))?;
    let removed = library.remove(index)?;
    println!("Deleted {} ({}).", removed.hanzi, removed.meaning);
    Ok(())
}

fn export(args: &[String]) -> hafal::Result<()> {
    let Some((out, paths)) = args.split_last() else {
        usage();
    };
    if paths.is_empty() {
        usage();
    }
    let out = Path::new(out);
    let library = Library::load(paths)?;

    if has_extension(out, "json") {
        let text = vocab::export_json(&library.items)?;
        std::fs::write(out, text).map_err(|e| Error::io(out, e))?;
    } else {
        vocab::export_summary_csv(out, &library.items)?;
    }
    tracing::info!(count = library.items.len(), path = %out.display(), "exported vocabulary");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::level_filters::LevelFilter;
    use tracing_subscriber::Layer;
    use tracing_subscriber::registry::Registry;

    fn max_level(filter: &EnvFilter) -> Option<LevelFilter> {
        <EnvFilter as Layer<Registry>>::max_level_hint(filter)
    }

    #[test]
    fn log_filter_honours_global_level() {
        assert_eq!(max_level(&log_filter(Some("debug"))), Some(LevelFilter::DEBUG));
        assert_eq!(max_level(&log_filter(Some("warn"))), Some(LevelFilter::WARN));
        assert_eq!(max_level(&log_filter(None)), Some(LevelFilter::INFO));
    }

    fn summary(name: &str) -> CategorySummary {
        CategorySummary {
            name: name.to_string(),
            total: 3,
            due: 1,
            mastered: 0,
        }
    }

    #[test]
    fn category_selection_by_number_or_name() {
        let summaries = [summary("Salam"), summary("Makanan"), summary("Hewan")];
        let names = |input: &str| parse_category_selection(input, &summaries);

        assert_eq!(names(""), Some(vec![]));
        assert_eq!(names(" all "), Some(vec![]));
        assert_eq!(names("0"), Some(vec![]));
        assert_eq!(
            names("3, makanan"),
            Some(vec!["Hewan".to_string(), "Makanan".to_string()])
        );
        assert_eq!(names("4"), None);
        assert_eq!(names("1,0"), None);
        assert_eq!(names("Minuman"), None);
    }
}
