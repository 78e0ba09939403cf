use analysis_core::{
    base_coin_of, CriterionScore, ExchangeClient, LlmScorer, NewsItem, NewsSource, Rubric, MAX_CRITERION_SCORE,
};
use std::sync::Arc;
use task_registry::{NewsEvaluation, NewsEvaluationParams, NewsEvaluationRecord, NewsReport, NewsSummary, TaskResult};

use crate::{JobError, TaskContext};

pub const NO_DATA_CRITERION: &str = "no data";
pub const NO_DATA_ERROR: &str = "no news data";
pub const SCORING_FAILED_CRITERION: &str = "evaluation failed";

/// Titles listed in a record's news summary
const SUMMARY_TITLES: usize = 3;

/// News fetch and rubric scoring for the most traded symbols
pub struct NewsEvaluationJob {
    exchange: Arc<dyn ExchangeClient>,
    news: Arc<dyn NewsSource>,
    scorer: Arc<dyn LlmScorer>,
    rubric: Rubric,
}

impl NewsEvaluationJob {
    pub fn new(exchange: Arc<dyn ExchangeClient>, news: Arc<dyn NewsSource>, scorer: Arc<dyn LlmScorer>) -> Self {
        Self {
            exchange,
            news,
            scorer,
            rubric: Rubric::crypto(),
        }
    }

    pub fn with_rubric(mut self, rubric: Rubric) -> Self {
        self.rubric = rubric;
        self
    }

    pub async fn run(&self, ctx: &TaskContext, params: &NewsEvaluationParams) -> Result<TaskResult, JobError> {
        ctx.step(0.0, "Starting news evaluation")?;

        ctx.step(0.1, &format!("Fetching top {} symbols by turnover", params.top_n))?;
        let symbols: Vec<String> = self
            .exchange
            .top_symbols_by_turnover(params.top_n)
            .await?
            .into_iter()
            .take(params.top_n)
            .map(|s| s.symbol)
            .collect();
        if symbols.is_empty() {
            return Err(JobError::Failed("Exchange returned no symbols".to_string()));
        }

        ctx.step(0.2, &format!("Fetching news for {} symbols", symbols.len()))?;
        let mut news_by_symbol = self.news.fetch_news(&symbols, params.news_per_symbol).await?;
        let total_news: usize = symbols
            .iter()
            .filter_map(|s| news_by_symbol.get(s))
            .map(|items| items.len().min(params.news_per_symbol))
            .sum();
        tracing::info!("[{}] Fetched {} news items", ctx.task_id(), total_news);

        ctx.step(0.3, "Evaluating news")?;
        let mut records = Vec::with_capacity(symbols.len());
        for (i, symbol) in symbols.iter().enumerate() {
            ctx.step(
                0.3 + 0.6 * i as f64 / symbols.len() as f64,
                &format!("Evaluating {} ({}/{})", symbol, i + 1, symbols.len()),
            )?;

            let mut items = news_by_symbol.remove(symbol).unwrap_or_default();
            items.truncate(params.news_per_symbol);
            records.push(self.evaluate_symbol(ctx, &params.model, symbol, items).await);
        }

        ctx.step(0.95, "Ranking results")?;
        // stable: equal scores keep symbol order
        records.sort_by(|a, b| {
            b.overall_score()
                .partial_cmp(&a.overall_score())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let summary = NewsSummary {
            total_symbols: symbols.len(),
            total_news,
            evaluation_model: params.model.clone(),
            top_performer: records.first().cloned(),
            average_score: average_score(&records),
        };

        Ok(TaskResult::NewsEvaluation(NewsReport {
            count: records.len(),
            data: records,
            summary,
        }))
    }

    async fn evaluate_symbol(
        &self,
        ctx: &TaskContext,
        model: &str,
        symbol: &str,
        items: Vec<NewsItem>,
    ) -> NewsEvaluationRecord {
        if items.is_empty() {
            tracing::info!("[{}] No news for {}", ctx.task_id(), symbol);
            return placeholder(symbol, items, NO_DATA_CRITERION, NO_DATA_ERROR.to_string());
        }

        let text = combine_news(&items);
        match self.scorer.score_text(model, &text, &self.rubric).await {
            Ok(scores) if !scores.is_empty() => {
                let evaluation = evaluate_scores(scores);
                tracing::info!(
                    "[{}] {} scored {:.1} (top: {})",
                    ctx.task_id(),
                    symbol,
                    evaluation.overall_score,
                    evaluation.top_criterion
                );
                NewsEvaluationRecord {
                    symbol: symbol.to_string(),
                    base_coin: base_coin_of(symbol).to_string(),
                    news_count: items.len(),
                    evaluation,
                    news_summary: summarize_news(&items),
                    news_items: items,
                    error: None,
                }
            }
            Ok(_) => {
                tracing::warn!("[{}] Scorer returned no criteria for {}", ctx.task_id(), symbol);
                placeholder(symbol, items, SCORING_FAILED_CRITERION, "empty evaluation".to_string())
            }
            Err(e) => {
                tracing::warn!("[{}] Scoring {} failed: {}", ctx.task_id(), symbol, e);
                placeholder(symbol, items, SCORING_FAILED_CRITERION, e.to_string())
            }
        }
    }
}

/// Overall and top-criterion scores as percentages of the attainable maximum.
pub fn evaluate_scores(scores: Vec<CriterionScore>) -> NewsEvaluation {
    let max = f64::from(MAX_CRITERION_SCORE);
    let total: f64 = scores.iter().map(|s| f64::from(s.score)).sum();
    let overall_score = if scores.is_empty() {
        0.0
    } else {
        total / (max * scores.len() as f64) * 100.0
    };

    // first criterion wins ties
    let top = scores
        .iter()
        .fold(None::<&CriterionScore>, |best, s| match best {
            Some(b) if b.score >= s.score => Some(b),
            _ => Some(s),
        });
    let (top_criterion, top_score) = match top {
        Some(s) => (s.criterion.clone(), f64::from(s.score) / max * 100.0),
        None => (String::new(), 0.0),
    };

    NewsEvaluation {
        overall_score,
        detailed_scores: scores,
        top_criterion,
        top_score,
    }
}

/// Text blob submitted to the scorer
pub fn combine_news(items: &[NewsItem]) -> String {
    let mut lines = Vec::with_capacity(items.len() * 4);
    for item in items {
        lines.push(format!("Title: {}", item.title));
        lines.push(format!("Content: {}", item.content));
        lines.push(format!("Source: {}", item.source));
        lines.push("---".to_string());
    }
    lines.join("\n")
}

pub fn summarize_news(items: &[NewsItem]) -> String {
    if items.is_empty() {
        return "No news found".to_string();
    }
    let titles: Vec<&str> = items.iter().take(SUMMARY_TITLES).map(|i| i.title.as_str()).collect();
    let ellipsis = if items.len() > SUMMARY_TITLES { "..." } else { "" };
    format!("{} items: {}{}", items.len(), titles.join("; "), ellipsis)
}

fn placeholder(symbol: &str, items: Vec<NewsItem>, criterion: &str, error: String) -> NewsEvaluationRecord {
    NewsEvaluationRecord {
        symbol: symbol.to_string(),
        base_coin: base_coin_of(symbol).to_string(),
        news_count: items.len(),
        evaluation: NewsEvaluation {
            overall_score: 0.0,
            detailed_scores: Vec::new(),
            top_criterion: criterion.to_string(),
            top_score: 0.0,
        },
        news_summary: summarize_news(&items),
        news_items: items,
        error: Some(error),
    }
}

fn average_score(records: &[NewsEvaluationRecord]) -> f64 {
    if records.is_empty() {
        return 0.0;
    }
    records.iter().map(|r| r.overall_score()).sum::<f64>() / records.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(title: &str) -> NewsItem {
        NewsItem {
            title: title.to_string(),
            content: format!("{} body", title),
            url: String::new(),
            published_at: None,
            source: "wire".to_string(),
            symbol: "BTCUSDT".to_string(),
        }
    }

    fn score(criterion: &str, score: u8) -> CriterionScore {
        CriterionScore {
            criterion: criterion.to_string(),
            score,
            explanation: String::new(),
        }
    }

    #[test]
    fn test_evaluate_scores() {
        let evaluation = evaluate_scores(vec![score("a", 3), score("b", 5), score("c", 4), score("d", 5), score("e", 3)]);
        assert!((evaluation.overall_score - 80.0).abs() < 1e-9);
        assert_eq!(evaluation.top_criterion, "b");
        assert!((evaluation.top_score - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_combine_news_layout() {
        let text = combine_news(&[item("One"), item("Two")]);
        assert_eq!(
            text,
            "Title: One\nContent: One body\nSource: wire\n---\nTitle: Two\nContent: Two body\nSource: wire\n---"
        );
    }

    #[test]
    fn test_summarize_news_truncates_titles() {
        assert_eq!(summarize_news(&[item("A"), item("B")]), "2 items: A; B");
        assert_eq!(
            summarize_news(&[item("A"), item("B"), item("C"), item("D")]),
            "4 items: A; B; C..."
        );
        assert_eq!(summarize_news(&[]), "No news found");
    }
}
