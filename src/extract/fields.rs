//! Labelled-field extraction from detail page text
//!
//! Every field is located by a labelled pattern over the rendered body text.
//! Patterns are case-insensitive and their captures are trimmed. A label
//! that does not appear yields an empty string (or `None` for numbers); it
//! is never an error.

use super::countdown::{auction_end, Countdown};
use crate::model::{
    AuctionInfo, AuctionValues, ExtractedRecord, Identification, Location, PropertyFeatures,
};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::Html;

/// Raw material captured from one detail page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetailSnapshot {
    /// Rendered text of the whole body
    pub body_text: String,
    /// `src` of the preview image
    pub image_url: Option<String>,
    /// Inner HTML of the title heading
    pub title_html: Option<String>,
    /// Text of the second full-width content block
    pub modality_text: Option<String>,
    /// Text of the first content paragraph
    pub discount_text: Option<String>,
    /// Inner HTML of the days, hours, minutes and seconds cells
    pub countdown_html: [Option<String>; 4],
}

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("field pattern should compile")
}

// ============================================================================
// Values
// ============================================================================

static APPRAISAL: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Valor de avaliação:\s*(R\$\s*[\d.,]+)"));
static MINIMUM_FIRST: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Valor mínimo de venda 1º Leilão:\s*(R\$\s*[\d.,]+)"));
static MINIMUM_SECOND: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Valor mínimo de venda 2º Leilão:\s*(R\$\s*[\d.,]+)"));

// ============================================================================
// Features
// ============================================================================

static PROPERTY_TYPE: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Tipo de imóvel:\s*(.+)"));
static ROOMS: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Quartos:\s*(\d+)"));
static GARAGE: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Garagem:\s*(\d+)"));
static TOTAL_AREA: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Área total\s*=\s*([\d.,]+m2)"));
static PRIVATE_AREA: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Área privativa\s*=\s*([\d.,]+m2)"));
static LAND_AREA: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Área do terreno\s*=\s*([\d.,]+m2)"));

// ============================================================================
// Identification
// ============================================================================

static PROPERTY_NUMBER: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Número do imóvel:\s*(.+)"));
static REGISTRATIONS: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Matrícula\(s\):\s*(.+)"));
static DISTRICT: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Comarca:\s*(.+)"));
static REGISTRY_OFFICE: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Ofício:\s*(\d+)"));
static MUNICIPAL_REGISTRATION: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Inscrição imobiliária:\s*(.+)"));
static NEGATIVE_AUCTION_NOTE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Averbação dos leilões negativos:\s*(.+)"));

// ============================================================================
// Auction
// ============================================================================

static EDITAL: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Edital:\s*(.+)"));
static ITEM_NUMBER: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Número do item:\s*(.+)"));
static AUCTIONEER: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)Leiloeiro\(a\):\s*(.+)"));
static FIRST_AUCTION_DATE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Data do 1º Leilão\s*-\s*(.+)"));
static SECOND_AUCTION_DATE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)Data do 2º Leilão\s*-\s*(.+)"));
static DISCOUNT: Lazy<Regex> = Lazy::new(|| pattern(r"desconto de (\d+,\d+%)"));

// ============================================================================
// Location and free text
// ============================================================================

static ADDRESS: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?is)Endereço:\s*(.+?)(?:\n|Baixar|Descrição|$)"));
static CEP: Lazy<Regex> = Lazy::new(|| pattern(r"(?i)CEP:\s*(\d{5}-\d{3})"));
static CITY_STATE: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?i)CEP:\s*\d{5}-\d{3},\s*(.+?)\s*-\s*(.+?)(?:\n|$)"));
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| pattern(r"(?is)Descrição:\s*(.+?)(?:\n\n|FORMAS DE PAGAMENTO|$)"));
static PAYMENT_METHODS: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?is)FORMAS DE PAGAMENTO ACEITAS:\s*(.+?)(?:\n\n|REGRAS PARA PAGAMENTO|$)")
});
static EXPENSE_RULES: Lazy<Regex> = Lazy::new(|| {
    pattern(r"(?is)REGRAS PARA PAGAMENTO DAS DESPESAS[^:]*:\s*(.+?)(?:\n\n|Imóvel com|$)")
});
static OBSERVATIONS: Lazy<Regex> = Lazy::new(|| pattern(r"(?is)Imóvel com (.+?)(?:\n\n|$)"));

/// Returns the trimmed first capture group, or an empty string
pub fn capture(pattern: &Regex, text: &str) -> String {
    capture_group(pattern, text, 1)
}

fn capture_group(pattern: &Regex, text: &str, group: usize) -> String {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default()
}

/// Returns the first capture group as a number, or `None`
pub fn capture_number(pattern: &Regex, text: &str) -> Option<u32> {
    let value = capture(pattern, text);
    if value.is_empty() {
        None
    } else {
        value.parse().ok()
    }
}

/// Text of an HTML fragment, with form inputs dropped
fn heading_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    let text: String = fragment
        .root_element()
        .descendants()
        .filter(|node| {
            !node.ancestors().any(|ancestor| {
                ancestor
                    .value()
                    .as_element()
                    .map(|element| element.name() == "input")
                    .unwrap_or(false)
            })
        })
        .filter_map(|node| node.value().as_text().map(|text| text.to_string()))
        .collect();
    text.trim().to_string()
}

/// Builds a record from a captured detail page
///
/// # Arguments
///
/// * `snapshot` - Body text and element captures of the detail page
/// * `now` - Extraction time, the origin of the countdown
pub fn extract_record(snapshot: &DetailSnapshot, now: DateTime<Utc>) -> ExtractedRecord {
    let text = snapshot.body_text.as_str();
    let countdown = Countdown::from_cells(&snapshot.countdown_html);

    ExtractedRecord {
        image_url: snapshot.image_url.clone().unwrap_or_default(),
        title: snapshot
            .title_html
            .as_deref()
            .map(heading_text)
            .unwrap_or_default(),
        values: AuctionValues {
            appraisal: capture(&APPRAISAL, text),
            minimum_first_auction: capture(&MINIMUM_FIRST, text),
            minimum_second_auction: capture(&MINIMUM_SECOND, text),
        },
        features: PropertyFeatures {
            property_type: capture(&PROPERTY_TYPE, text),
            rooms: capture_number(&ROOMS, text),
            garage: capture_number(&GARAGE, text),
            total_area: capture(&TOTAL_AREA, text),
            private_area: capture(&PRIVATE_AREA, text),
            land_area: capture(&LAND_AREA, text),
        },
        identification: Identification {
            property_number: capture(&PROPERTY_NUMBER, text),
            registrations: capture(&REGISTRATIONS, text),
            district: capture(&DISTRICT, text),
            registry_office: capture_number(&REGISTRY_OFFICE, text),
            municipal_registration: capture(&MUNICIPAL_REGISTRATION, text),
            negative_auction_note: capture(&NEGATIVE_AUCTION_NOTE, text),
        },
        auction: AuctionInfo {
            modality: snapshot
                .modality_text
                .as_deref()
                .map(str::trim)
                .unwrap_or_default()
                .to_string(),
            edital: capture(&EDITAL, text),
            item_number: capture(&ITEM_NUMBER, text),
            auctioneer: capture(&AUCTIONEER, text),
            first_auction_date: capture(&FIRST_AUCTION_DATE, text),
            second_auction_date: capture(&SECOND_AUCTION_DATE, text),
            discount: snapshot
                .discount_text
                .as_deref()
                .map(|paragraph| capture(&DISCOUNT, paragraph))
                .unwrap_or_default(),
        },
        location: Location {
            address: capture(&ADDRESS, text),
            cep: capture(&CEP, text),
            city: capture_group(&CITY_STATE, text, 1),
            state: capture_group(&CITY_STATE, text, 2),
        },
        auction_ends_at: auction_end(&countdown, now),
        description: capture(&DESCRIPTION, text),
        payment_methods: capture(&PAYMENT_METHODS, text),
        expense_rules: capture(&EXPENSE_RULES, text),
        observations: capture(&OBSERVATIONS, text),
    }
}
