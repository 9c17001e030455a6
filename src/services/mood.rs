//! Mood classifier: static mood → genre table plus keyword inference for
//! free-form assistant queries.
//!
//! Genre ids are the catalog's movie genre ids. Series queries go through
//! [`series_genres`], which maps the few movie-only ids onto their series
//! counterparts.

use crate::error::AppResult;
use crate::models::Mood;

/// Ordered genre ids for a mood; never empty
pub fn genres_for(mood: Mood) -> &'static [u32] {
    match mood {
        // Comedy, Family, Animation
        Mood::Happy => &[35, 10751, 16],
        // Drama, Romance, Music
        Mood::Melancholic => &[18, 10749, 10402],
        // Action, Adventure, Science Fiction
        Mood::Excited => &[28, 12, 878],
        // Documentary, Family, Comedy
        Mood::Relaxed => &[99, 10751, 35],
        // Romance, Comedy, Drama
        Mood::Romantic => &[10749, 35, 18],
        // Thriller, Horror, Mystery, Crime
        Mood::Tense => &[53, 27, 9648, 80],
        // Drama, Documentary, History, Mystery
        Mood::Thoughtful => &[18, 99, 36, 9648],
        // Animation, Comedy, Family, Fantasy
        Mood::Playful => &[16, 35, 10751, 14],
    }
}

/// String-tag variant of [`genres_for`]; unknown tags fail with `UnknownMood`
pub fn genres_for_tag(tag: &str) -> AppResult<&'static [u32]> {
    Ok(genres_for(tag.parse()?))
}

/// Translates movie genre ids to series genre ids, dropping ids with no
/// series counterpart and keeping first-seen order
pub fn series_genres(movie_genres: &[u32]) -> Vec<u32> {
    let mut translated = Vec::with_capacity(movie_genres.len());
    for genre in movie_genres {
        let series = match genre {
            // Action, Adventure → Action & Adventure
            28 | 12 => Some(10759),
            // Science Fiction, Fantasy → Sci-Fi & Fantasy
            878 | 14 => Some(10765),
            // War → War & Politics
            10752 => Some(10768),
            // Thriller, Horror, Romance, Music, History have no series genre
            53 | 27 | 10749 | 10402 | 36 => None,
            other => Some(*other),
        };
        if let Some(id) = series {
            if !translated.contains(&id) {
                translated.push(id);
            }
        }
    }
    translated
}

fn keywords(mood: Mood) -> &'static [&'static str] {
    match mood {
        Mood::Happy => &["happy", "cheer", "cheerful", "funny", "laugh", "laughs", "uplifting", "feel good"],
        Mood::Melancholic => &["sad", "sadness", "melancholic", "cry", "crying", "heartbreak", "heartbreaking", "bittersweet", "tearjerker"],
        Mood::Excited => &["excited", "exciting", "action", "adrenaline", "thrill ride", "explosive", "epic"],
        Mood::Relaxed => &["relax", "relaxing", "relaxed", "calm", "chill", "cozy", "easy", "unwind"],
        Mood::Romantic => &["romantic", "romance", "love", "date night"],
        Mood::Tense => &["tense", "scary", "horror", "suspense", "thriller", "creepy"],
        Mood::Thoughtful => &["thoughtful", "deep", "documentary", "think", "thinking", "smart", "philosophical"],
        Mood::Playful => &["playful", "silly", "kids", "animated", "cartoon", "whimsical"],
    }
}

/// Lowercased alphanumeric words of `text`
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `keyword`'s words occur back to back in `query_words`
fn contains_phrase(query_words: &[String], keyword: &str) -> bool {
    let phrase = words(keyword);
    !phrase.is_empty() && query_words.windows(phrase.len()).any(|window| window == phrase.as_slice())
}

impl Mood {
    /// Picks a mood for a free-form query: first mood (enumeration order) with a
    /// keyword matching whole words wins
    pub fn infer(query: &str) -> Option<Mood> {
        if let Ok(mood) = query.trim().parse::<Mood>() {
            return Some(mood);
        }

        let query_words = words(query);
        Mood::ALL.into_iter().find(|mood| {
            keywords(*mood)
                .iter()
                .any(|kw| contains_phrase(&query_words, kw))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_every_mood_has_genres() {
        for mood in Mood::ALL {
            assert!(!genres_for(mood).is_empty(), "{} has no genres", mood);
        }
    }

    #[test]
    fn test_every_mood_keeps_a_series_genre() {
        for mood in Mood::ALL {
            assert!(
                !series_genres(genres_for(mood)).is_empty(),
                "{} has no series genres",
                mood
            );
        }
    }

    #[test]
    fn test_happy_genres() {
        assert_eq!(genres_for(Mood::Happy), &[35, 10751, 16]);
    }

    #[test]
    fn test_genres_for_unknown_tag() {
        assert!(matches!(
            genres_for_tag("hangry"),
            Err(AppError::UnknownMood(_))
        ));
        assert_eq!(genres_for_tag("Excited").unwrap(), &[28, 12, 878]);
    }

    #[test]
    fn test_series_translation_dedups_and_drops() {
        assert_eq!(series_genres(&[28, 12, 878]), vec![10759, 10765]);
        assert_eq!(series_genres(&[53, 27, 9648, 80]), vec![9648, 80]);
        assert_eq!(series_genres(&[35, 10751, 16]), vec![35, 10751, 16]);
    }

    #[test]
    fn test_infer_mood_from_query() {
        assert_eq!(Mood::infer("Something to make me laugh tonight"), Some(Mood::Happy));
        assert_eq!(Mood::infer("a creepy movie please"), Some(Mood::Tense));
        assert_eq!(Mood::infer("ROMANTIC"), Some(Mood::Romantic));
        assert_eq!(Mood::infer("quarterly tax forms"), None);
        assert_eq!(Mood::infer("a feel-good comedy"), Some(Mood::Happy));
        assert_eq!(Mood::infer("Date night, something light"), Some(Mood::Romantic));
    }

    #[test]
    fn test_infer_ignores_keywords_inside_words() {
        assert_eq!(Mood::infer("a crystal-clear epic"), Some(Mood::Excited));
        assert_eq!(Mood::infer("the last crusade"), None);
        assert_eq!(Mood::infer("no distractions"), None);
    }
}
