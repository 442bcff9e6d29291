use crate::modules::provider::domain::{FilmDetails, SearchItem};
use strsim::jaro_winkler;

/// Lowest similarity of normalised titles accepted as the same title
pub const TITLE_MATCH_THRESHOLD: f64 = 0.85;

/// Lowercase, keep letters, digits and single spaces
pub fn normalize_title(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Search hit most likely to be `film`, if any is close enough.
///
/// Film type must agree, and so must the year when both sides know it.
pub fn best_match<'a>(film: &FilmDetails, results: &'a [SearchItem]) -> Option<&'a SearchItem> {
    let wanted = normalize_title(&film.title);

    results
        .iter()
        .filter(|item| item.film_type == film.film_type)
        .filter(|item| match (film.year, item.year) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        })
        .map(|item| (item, jaro_winkler(&wanted, &normalize_title(&item.title))))
        .filter(|(_, score)| *score >= TITLE_MATCH_THRESHOLD)
        .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(item, _)| item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::provider::domain::FilmType;

    fn hit(id: &str, title: &str, film_type: FilmType, year: Option<i32>) -> SearchItem {
        SearchItem {
            id: id.to_string(),
            title: title.to_string(),
            film_type,
            year,
            poster: None,
        }
    }

    #[test]
    fn normalisation_ignores_case_and_punctuation() {
        assert_eq!(normalize_title("  The Matrix:  Reloaded! "), "the matrix reloaded");
    }

    #[test]
    fn picks_the_closest_title_of_the_same_kind_and_year() {
        let film = FilmDetails::movie("603", "The Matrix", Some(1999));
        let results = vec![
            hit("a", "The Matrix", FilmType::TvShow, Some(1999)),
            hit("b", "The Matrix", FilmType::Movie, Some(2021)),
            hit("c", "Matrix, The", FilmType::Movie, Some(1999)),
            hit("d", "the matrix", FilmType::Movie, Some(1999)),
        ];
        assert_eq!(best_match(&film, &results).map(|i| i.id.as_str()), Some("d"));
    }

    #[test]
    fn unrelated_titles_do_not_match() {
        let film = FilmDetails::movie("1", "Alien", None);
        let results = vec![hit("x", "Paddington", FilmType::Movie, None)];
        assert!(best_match(&film, &results).is_none());
    }
}
