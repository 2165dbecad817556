use crate::models::Id;
use crate::store::{AdStore, StoreError};

const MAX_SLUG_LENGTH: usize = 50;

fn fold(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        c if c.is_ascii_alphanumeric() => c,
        _ => return None,
    };
    Some(folded)
}

/// Lowercase ASCII words joined by `-`, at most 50 characters.
pub fn slugify(text: &str) -> String {
    let mut slug = String::new();
    let mut pending_dash = false;
    for c in text.chars().flat_map(char::to_lowercase) {
        match fold(c) {
            Some(c) => {
                if pending_dash && !slug.is_empty() {
                    slug.push('-');
                }
                pending_dash = false;
                slug.push(c);
            }
            None => pending_dash = true,
        }
        if slug.len() >= MAX_SLUG_LENGTH {
            break;
        }
    }
    slug.truncate(MAX_SLUG_LENGTH);
    slug.trim_end_matches('-').to_string()
}

/// Slug for an ad, suffixed `-2`, `-3`… until no other ad uses it.
pub async fn unique_slug(
    store: &dyn AdStore,
    description: Option<&str>,
    address: &str,
    except: Option<Id>,
) -> Result<String, StoreError> {
    let mut base = description.map(slugify).unwrap_or_default();
    if base.is_empty() {
        base = slugify(address);
    }
    if base.is_empty() {
        base = "ad".to_string();
    }

    let mut candidate = base.clone();
    let mut n = 2;
    while store.slug_taken(&candidate, except).await? {
        candidate = format!("{}-{}", base, n);
        n += 1;
    }
    Ok(candidate)
}
