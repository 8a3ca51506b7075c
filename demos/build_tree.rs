use raptor_tree::hierarchy::HealthCheck;
use raptor_tree::summarize::DEFAULT_DELIMITER;
use raptor_tree::{
    ingest_in_batches, HashingEmbedder, MemorySink, PromptSummarizer, RaptorBuilder, RetryPolicy,
    RetryingSummarizer, TreeConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=raptor_tree=debug shows per-cluster events.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let topics = [
        ("orchard", ["apples ripen in late summer", "pear trees need pruning", "cherries split after rain", "plums bruise easily"]),
        ("engines", ["pistons compress the mixture", "the crankshaft turns", "valves open on the intake stroke", "spark plugs ignite the charge"]),
        ("music", ["the violin carries the melody", "cellos hold the bass line", "flutes double the theme", "timpani mark the cadence"]),
    ];
    let chunks: Vec<String> = topics
        .iter()
        .flat_map(|(topic, lines)| lines.iter().map(move |l| format!("{topic}: {l}.")))
        .collect();

    // Stand-in for an LLM: the opening words of every excerpt.
    let complete = |prompt: &str| -> raptor_tree::Result<String> {
        let body = prompt
            .trim_start_matches("Here is a document excerpt:\n\n")
            .trim_end_matches("\n\nPlease provide a detailed summary:");
        Ok(body
            .split(DEFAULT_DELIMITER)
            .map(|part| part.split_whitespace().take(6).collect::<Vec<_>>().join(" "))
            .collect::<Vec<_>>()
            .join("; "))
    };
    let summarizer = RetryingSummarizer::new(PromptSummarizer::new(complete), RetryPolicy::new());
    let embedder = HashingEmbedder::new(64)?;

    let config = TreeConfig::default().with_target_dim(2);
    let tree = RaptorBuilder::new(&embedder, summarizer, config).build(&chunks)?;

    for level in tree.levels() {
        println!("level {} ({} clusters)", level.level, level.unique_cluster_count());
        for row in &level.summaries {
            println!("  [{}] {}", row.cluster, row.summary);
        }
    }

    let health = tree.health_check();
    println!("\n{health}");

    let mut sink = MemorySink::new();
    let report = ingest_in_batches(&tree.collapsed_texts(), 8, &embedder, &mut sink, &RetryPolicy::new())?;
    println!("ingested {} texts in {} batches", report.ingested, report.batches);

    Ok(())
}
