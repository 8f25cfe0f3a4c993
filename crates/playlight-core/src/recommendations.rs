//! Recommendation lists for the discovery overlay and widgets.

use std::collections::HashSet;

use tracing::error;

use crate::api::{ApiClient, Game, Transport};

/// Default number of games shown.
pub const DEFAULT_THRESHOLD: usize = 10;

/// Append games from `extra` whose ids are not already present, then cut to `limit`.
#[must_use]
pub fn merge_unique(mut games: Vec<Game>, extra: Vec<Game>, limit: usize) -> Vec<Game> {
    let mut seen: HashSet<_> = games.iter().map(|g| g.id.clone()).collect();
    for game in extra {
        if seen.insert(game.id.clone()) {
            games.push(game);
        }
    }
    games.truncate(limit);
    games
}

/// Suggestions for `category`, topped up from the uncategorised list.
pub async fn recommended_games<T: Transport + 'static>(
    api: &ApiClient<T>,
    category: Option<&str>,
    threshold: usize,
) -> Vec<Game> {
    let first = api.get_suggestions(category, Some(1)).await;
    if let Some(page_size) = first.as_ref().and_then(|s| s.page_size) {
        if page_size < threshold {
            error!(page_size, threshold, "threshold exceeds page size, every request will refetch");
        }
    }
    let games = first.map(|s| s.games).unwrap_or_default();
    if games.len() >= threshold || category.is_none() {
        return merge_unique(games, Vec::new(), threshold);
    }
    let more = api
        .get_suggestions(None, Some(1))
        .await
        .map(|s| s.games)
        .unwrap_or_default();
    merge_unique(games, more, threshold)
}

/// Suggestions for the current game's category, or the last known category.
pub async fn quick_recommendations<T: Transport + 'static>(api: &ApiClient<T>, threshold: usize) -> Vec<Game> {
    let (categories, current) = futures::join!(api.get_categories(), api.get_current_game_info());
    let category = current
        .and_then(|g| g.category)
        .or_else(|| categories.and_then(|mut c| c.pop()));
    recommended_games(api, category.as_deref(), threshold).await
}
