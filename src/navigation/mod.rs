//! Navigation module
//!
//! This module drives the search form and result pages through a
//! [`Session`]:
//! - `primitives`: the session handle, wait conditions and verified actions
//! - `region`: enumerating regions/sub-regions and selecting one unit
//! - `pagination`: counting listing pages and items, moving between pages
//! - `detail`: opening an item, waiting for its detail page, returning

mod detail;
mod pagination;
mod primitives;
mod region;

pub use detail::{capture_detail, open_item, return_to_listing, DetailMarker};
pub use pagination::{count_items_on_page, goto_page, total_pages, ListingShape};
pub use primitives::{Condition, Session, Timings};
pub use region::{
    enumerate_units, is_placeholder, read_options, return_to_selector, select_unit, SelectOption,
};

/// CSS selectors of the auction search site
pub mod selectors {
    pub const REGION_SELECT: &str = "#cmb_estado";
    pub const SUB_REGION_SELECT: &str = "#cmb_cidade";
    pub const SUB_REGION_OPTION: &str = "#cmb_cidade option";

    /// Link that reopens the search form from a listing
    pub const ALTER_CONTROL: &str = "#altera_0 a";

    /// Confirmation buttons between the form and the listing, in click order
    pub const NEXT_STEPS: [&str; 2] = ["#btn_next0", "#btn_next1"];

    pub const PAGINATION: &str = "#paginacao";
    pub const PAGINATION_LINK: &str = "#paginacao a[href*=\"carregaListaImoveis\"]";
    pub const LISTING_ITEM: &str = "ul.control-group.no-bullets";
    pub const DETAIL_LINK: &str = "a[onclick*=\"detalhe_imovel\"]";

    pub const DETAIL_PREVIEW: &str = "#preview";
    pub const DETAIL_CONTENT: &str = ".content";
    pub const DETAIL_HEADING: &str = "h5";
    pub const DETAIL_BLOCK: &str = ".control-span-12_12";
    /// The title is the `h5` of the first block matching this selector
    pub const TITLE_BLOCK: &str = "div.control-item.control-span-12_12";
    pub const TITLE_HEADING: &str = "h5";
    pub const DISCOUNT_PARAGRAPH: &str = ".content p";

    /// Days, hours, minutes and seconds of the auction countdown
    pub const COUNTDOWN_CELLS: [&str; 4] = ["#dias0", "#horas0", "#minutos0", "#segundos0"];

    /// Body text length above which a detail page is considered rendered
    pub const DETAIL_BODY_MIN_CHARS: usize = 100;
}
