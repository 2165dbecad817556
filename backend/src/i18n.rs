use axum::http::{header, HeaderMap};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fr,
}

impl Locale {
    /// First supported language listed in `Accept-Language`.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(header::ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| {
                value.split(',').find_map(|entry| {
                    let tag = entry.split(';').next().unwrap_or_default().trim();
                    let primary = tag.split('-').next().unwrap_or_default();
                    match primary.to_ascii_lowercase().as_str() {
                        "fr" => Some(Locale::Fr),
                        "en" => Some(Locale::En),
                        _ => None,
                    }
                })
            })
            .unwrap_or_default()
    }

    pub fn no_results(self) -> String {
        match self {
            Locale::En => {
                "No ad matches your search. Widen the search area or change your criteria."
            }
            Locale::Fr => {
                "Aucune annonce ne correspond à votre recherche. \
                 Elargissez votre zone de recherche ou modifiez les critères."
            }
        }
        .to_string()
    }

    pub fn results(self, count: usize) -> String {
        match (self, count) {
            (Locale::En, 1) => "1 ad matches your search.".to_string(),
            (Locale::En, n) => format!("{} ads match your search.", n),
            (Locale::Fr, n) if n <= 1 => format!("{} annonce correspondant à votre recherche.", n),
            (Locale::Fr, n) => format!("{} annonces correspondant à votre recherche.", n),
        }
    }

    pub fn search_saved(self) -> String {
        match self {
            Locale::En => "Your search has been saved to your account.",
            Locale::Fr => "Votre recherche a bien été sauvegardée dans votre compte.",
        }
        .to_string()
    }

    pub fn search_updated(self, account_url: &str) -> String {
        match self {
            Locale::En => format!("Your search has been updated in your account ({}).", account_url),
            Locale::Fr => format!(
                "Votre recherche a bien été mise à jour dans votre compte ({}).",
                account_url
            ),
        }
    }

    pub fn search_deleted(self) -> String {
        match self {
            Locale::En => "Your search has been deleted.",
            Locale::Fr => "Votre recherche a bien été supprimée.",
        }
        .to_string()
    }

    pub fn message_sent(self) -> String {
        match self {
            Locale::En => "Your message has been sent.",
            Locale::Fr => "Votre message a bien été envoyé.",
        }
        .to_string()
    }

    pub fn own_ad_contact(self) -> String {
        match self {
            Locale::En => "You cannot send a message about your own ad.",
            Locale::Fr => "Vous ne pouvez pas envoyer de message pour votre propre annonce.",
        }
        .to_string()
    }

    pub fn ad_deleted(self) -> String {
        match self {
            Locale::En => "Your ad has been deleted.",
            Locale::Fr => "Votre annonce a bien été supprimée.",
        }
        .to_string()
    }

    pub fn buyer_contacted(self) -> String {
        match self {
            Locale::En => "The buyer has been contacted.",
            Locale::Fr => "L'acheteur potentiel a bien été contacté.",
        }
        .to_string()
    }

    pub fn buyer_already_contacted(self) -> String {
        match self {
            Locale::En => "You already contacted this buyer.",
            Locale::Fr => "Vous avez déjà contacté cet acheteur potentiel.",
        }
        .to_string()
    }

    pub fn address_not_found(self) -> String {
        match self {
            Locale::En => "This address could not be located, please check it.",
            Locale::Fr => "Cette adresse n'a pas pu être localisée, merci de la vérifier.",
        }
        .to_string()
    }
}
