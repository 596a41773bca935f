//! In-memory auction site
//!
//! `MockSite` implements [`BrowserDriver`] over a scripted site model with
//! the same DOM shape as the real search form: region and sub-region
//! selects, a two-step confirmation, a paginated listing and detail pages.
//! Every query renders the current screen to HTML and answers it with
//! `scraper`, so selectors behave the way they do in a browser.
//!
//! Failures can be injected per sub-region to exercise the retry paths.

use super::traits::{
    BoundingBox, BrowserDriver, DriverError, DriverResult, ElementInfo, ElementSnapshot, Locator,
};
use crate::navigation::selectors;
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};

/// One property on a listing page, together with its detail page
#[derive(Debug, Clone)]
pub struct MockItem {
    pub title: String,
    pub body_text: String,
    pub image_src: Option<String>,
    pub modality: String,
    pub discount_note: String,
    /// Days, hours, minutes, seconds shown in the countdown cells
    pub countdown: Option<[u32; 4]>,
    /// Render the detail page without any of the usual markers
    pub bare: bool,
    /// Full-width block without a heading, shown above the title
    pub notice: Option<String>,
}

impl MockItem {
    /// Creates an item whose detail text carries every extractable label
    pub fn new(title: &str, property_number: &str) -> Self {
        let body_text = format!(
            "{title}\n\
             Valor de avaliação: R$ 150.000,00\n\
             Valor mínimo de venda 1º Leilão: R$ 150.000,00\n\
             Valor mínimo de venda 2º Leilão: R$ 90.000,00\n\
             Tipo de imóvel: Casa\n\
             Quartos: 2\n\
             Garagem: 1\n\
             Número do imóvel: {property_number}\n\
             Matrícula(s): 45873\n\
             Comarca: CURITIBA-PR\n\
             Ofício: 2\n\
             Inscrição imobiliária: 03.2.0041.0123.00\n\
             Averbação dos leilões negativos: Não averbado\n\
             Área total = 120,00m2\n\
             Área privativa = 80,50m2\n\
             Área do terreno = 200,00m2\n\
             Edital: 0042/2026\n\
             Número do item: 7\n\
             Leiloeiro(a): Maria Souza\n\
             Data do 1º Leilão - 10/11/2026 - 10h00\n\
             Data do 2º Leilão - 24/11/2026 - 10h00\n\
             Endereço: RUA DAS FLORES, N. 100, CENTRO\n\
             CEP: 80010-000, CURITIBA - PARANA\n\
             \n\
             Descrição: Casa, 120,00 de área total, 2 qto(s), 1 vaga(s) na garagem.\n\
             \n\
             FORMAS DE PAGAMENTO ACEITAS: Recursos próprios.\n\
             \n\
             REGRAS PARA PAGAMENTO DAS DESPESAS (caso existam): Condomínio sob responsabilidade do comprador.\n\
             \n\
             Imóvel com ocupante.\n"
        );

        Self {
            title: title.to_string(),
            body_text,
            image_src: Some(format!("/fotos/F{property_number}21.jpg")),
            modality: "Leilão SFI - Edital Único".to_string(),
            discount_note: "Imóvel à venda com desconto de 40,00% sobre a avaliação".to_string(),
            countdown: Some([2, 3, 0, 0]),
            bare: false,
            notice: None,
        }
    }

    /// Replaces the detail body text
    pub fn with_body(mut self, body_text: impl Into<String>) -> Self {
        self.body_text = body_text.into();
        self
    }

    /// Drops the preview image, content blocks and headings from the detail page
    pub fn without_markers(mut self) -> Self {
        self.bare = true;
        self
    }

    pub fn with_countdown(mut self, countdown: Option<[u32; 4]>) -> Self {
        self.countdown = countdown;
        self
    }

    pub fn with_notice(mut self, notice: &str) -> Self {
        self.notice = Some(notice.to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockSubRegion {
    pub id: String,
    pub label: String,
    pub pages: Vec<Vec<MockItem>>,
    /// Render the listing without a pagination control
    pub hide_pagination: bool,
}

impl MockSubRegion {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            pages: Vec::new(),
            hide_pagination: false,
        }
    }

    pub fn with_page(mut self, items: Vec<MockItem>) -> Self {
        self.pages.push(items);
        self
    }

    pub fn without_pagination(mut self) -> Self {
        self.hide_pagination = true;
        self
    }
}

#[derive(Debug, Clone)]
pub struct MockRegion {
    pub id: String,
    pub label: String,
    pub sub_regions: Vec<MockSubRegion>,
}

impl MockRegion {
    pub fn new(id: &str, label: &str, sub_regions: Vec<MockSubRegion>) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            sub_regions,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormStep {
    Choosing,
    Confirming,
    /// The second confirmation button is rendered hidden
    Stuck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Screen {
    Blank,
    Form {
        region: Option<usize>,
        sub: Option<usize>,
        step: FormStep,
    },
    Listing {
        region: usize,
        sub: usize,
        page: usize,
    },
    Detail {
        region: usize,
        sub: usize,
        page: usize,
        item: usize,
    },
}

impl Screen {
    fn fresh_form() -> Self {
        Self::Form {
            region: None,
            sub: None,
            step: FormStep::Choosing,
        }
    }
}

/// Element resolved from the rendered document
struct Located {
    info: ElementInfo,
    outer_html: String,
}

/// Scripted auction site driven through [`BrowserDriver`]
#[derive(Debug, Clone)]
pub struct MockSite {
    regions: Vec<MockRegion>,
    screen: Screen,
    history: Vec<Screen>,
    closed: bool,
    stuck_steps: HashMap<String, u32>,
    crash_on: HashSet<String>,
    root_visits: usize,
    back_navigations: usize,
}

impl MockSite {
    pub fn new(regions: Vec<MockRegion>) -> Self {
        Self {
            regions,
            screen: Screen::Blank,
            history: Vec::new(),
            closed: false,
            stuck_steps: HashMap::new(),
            crash_on: HashSet::new(),
            root_visits: 0,
            back_navigations: 0,
        }
    }

    /// Hides the second confirmation button for the next `times` selections
    /// of the given sub-region
    pub fn with_stuck_step(mut self, sub_region_id: &str, times: u32) -> Self {
        self.stuck_steps.insert(sub_region_id.to_string(), times);
        self
    }

    /// Kills the session when the given sub-region is selected
    pub fn with_crash_on(mut self, sub_region_id: &str) -> Self {
        self.crash_on.insert(sub_region_id.to_string());
        self
    }

    /// Number of times the root page was loaded
    pub fn root_visits(&self) -> usize {
        self.root_visits
    }

    pub fn back_navigations(&self) -> usize {
        self.back_navigations
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed {
            Err(DriverError::SessionClosed)
        } else {
            Ok(())
        }
    }

    fn sub_region(&self, region: usize, sub: usize) -> Option<&MockSubRegion> {
        self.regions.get(region)?.sub_regions.get(sub)
    }

    fn item(&self, region: usize, sub: usize, page: usize, item: usize) -> Option<&MockItem> {
        self.sub_region(region, sub)?.pages.get(page)?.get(item)
    }

    // ===== Rendering =====

    fn render(&self) -> String {
        let body = match self.screen {
            Screen::Blank => String::new(),
            Screen::Form { region, sub, step } => self.render_form(region, sub, step),
            Screen::Listing { region, sub, page } => self.render_listing(region, sub, page),
            Screen::Detail {
                region,
                sub,
                page,
                item,
            } => self.render_detail(region, sub, page, item),
        };
        format!("<html><head><title>Busca de imóveis</title></head><body>{body}</body></html>")
    }

    fn render_form(&self, region: Option<usize>, sub: Option<usize>, step: FormStep) -> String {
        let mut html = String::from("<form id=\"form_busca\">");

        html.push_str("<select id=\"cmb_estado\"><option value=\"\">Selecione</option>");
        for (i, r) in self.regions.iter().enumerate() {
            html.push_str(&option(&r.id, &r.label, region == Some(i)));
        }
        html.push_str("</select>");

        html.push_str("<select id=\"cmb_cidade\"><option value=\"\">Selecione</option>");
        if let Some(r) = region.and_then(|i| self.regions.get(i)) {
            for (j, s) in r.sub_regions.iter().enumerate() {
                html.push_str(&option(&s.id, &s.label, sub == Some(j)));
            }
        }
        html.push_str("</select>");

        if sub.is_some() {
            match step {
                FormStep::Choosing => html.push_str(
                    "<button id=\"btn_next0\" type=\"button\" data-action=\"next0\">Próximo</button>",
                ),
                FormStep::Confirming => html.push_str(
                    "<button id=\"btn_next1\" type=\"button\" data-action=\"next1\">Próximo</button>",
                ),
                FormStep::Stuck => html.push_str(
                    "<button id=\"btn_next1\" type=\"button\" style=\"display: none\" data-action=\"next1\">Próximo</button>",
                ),
            }
        }

        html.push_str("</form>");
        html
    }

    fn render_listing(&self, region: usize, sub: usize, page: usize) -> String {
        let mut html = String::from(
            "<div id=\"altera_0\"><a href=\"#\" data-action=\"alter\">Alterar busca</a></div>",
        );
        let Some(s) = self.sub_region(region, sub) else {
            return html;
        };

        if !s.pages.is_empty() && !s.hide_pagination {
            html.push_str("<div id=\"paginacao\">");
            for p in 0..s.pages.len() {
                html.push_str(&format!(
                    "<a href=\"javascript:carregaListaImoveis({n});\" data-action=\"page:{p}\">{n}</a>",
                    n = p + 1
                ));
            }
            html.push_str("</div>");
        }

        if let Some(items) = s.pages.get(page) {
            for (i, item) in items.iter().enumerate() {
                html.push_str(&format!(
                    "<ul class=\"control-group no-bullets\"><li><span>{}</span></li>\
                     <li><a href=\"#\" onclick=\"javascript:detalhe_imovel({i});\" data-action=\"detail:{i}\">Detalhes do imóvel</a></li></ul>",
                    escape(&item.title)
                ));
            }
        } else {
            html.push_str("<p class=\"sem-resultados\">Nenhum imóvel encontrado.</p>");
        }

        html
    }

    fn render_detail(&self, region: usize, sub: usize, page: usize, item: usize) -> String {
        let Some(item) = self.item(region, sub, page, item) else {
            return String::new();
        };
        let mut html = String::new();

        if !item.bare {
            if let Some(notice) = &item.notice {
                html.push_str(&format!(
                    "<div class=\"control-item control-span-12_12\"><p>{}</p></div>",
                    escape(notice)
                ));
            }
            html.push_str(&format!(
                "<div class=\"control-item control-span-12_12\"><h5>{}<input type=\"hidden\" value=\"favorito\"></h5></div>",
                escape(&item.title)
            ));
            html.push_str(&format!(
                "<div class=\"control-item control-span-12_12\"><span>{}</span></div>",
                escape(&item.modality)
            ));
            if let Some(src) = &item.image_src {
                html.push_str(&format!("<img id=\"preview\" src=\"{}\">", escape(src)));
            }
            html.push_str(&format!(
                "<div class=\"content\"><p>{}</p></div>",
                escape(&item.discount_note)
            ));
        }

        if let Some(cells) = item.countdown {
            for (id, value) in selectors::COUNTDOWN_CELLS.iter().zip(cells) {
                html.push_str(&format!(
                    "<span id=\"{}\">&nbsp;<b>{value}</b>&nbsp;</span>",
                    id.trim_start_matches('#')
                ));
            }
        }

        html.push_str(&format!("<div class=\"texto\">{}</div>", escape(&item.body_text)));
        html
    }

    // ===== Queries =====

    fn parse_selector(selector: &str) -> DriverResult<Selector> {
        Selector::parse(selector).map_err(|e| DriverError::InvalidSelector {
            selector: selector.to_string(),
            message: format!("{e:?}"),
        })
    }

    fn query(&self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        let parsed = Self::parse_selector(selector)?;
        let document = Html::parse_document(&self.render());
        Ok(document.select(&parsed).map(element_info).collect())
    }

    fn locate(&self, locator: &Locator) -> DriverResult<Option<Located>> {
        let parsed = Self::parse_selector(&locator.selector)?;
        let child = locator
            .child
            .as_deref()
            .map(Self::parse_selector)
            .transpose()?;
        let document = Html::parse_document(&self.render());

        let Some(element) = document.select(&parsed).nth(locator.index) else {
            return Ok(None);
        };
        let target = match &child {
            Some(child) => match element.select(child).next() {
                Some(found) => found,
                None => return Ok(None),
            },
            None => element,
        };

        Ok(Some(Located {
            info: element_info(target),
            outer_html: target.html(),
        }))
    }

    // ===== Actions =====

    fn perform(&mut self, action: &str) -> DriverResult<()> {
        match (action, self.screen) {
            ("next0", Screen::Form { region, sub: Some(sub), .. }) => {
                let sub_id = region
                    .and_then(|r| self.sub_region(r, sub))
                    .map(|s| s.id.clone());
                let remaining = match sub_id {
                    Some(id) => self.stuck_steps.get_mut(&id),
                    None => None,
                };
                let stuck = match remaining {
                    Some(remaining) if *remaining > 0 => {
                        *remaining -= 1;
                        true
                    }
                    _ => false,
                };
                let step = if stuck {
                    FormStep::Stuck
                } else {
                    FormStep::Confirming
                };
                self.screen = Screen::Form {
                    region,
                    sub: Some(sub),
                    step,
                };
            }
            ("next1", Screen::Form {
                region: Some(region),
                sub: Some(sub),
                step: FormStep::Confirming,
            }) => {
                self.history.push(self.screen);
                self.screen = Screen::Listing {
                    region,
                    sub,
                    page: 0,
                };
            }
            ("alter", Screen::Listing { .. }) => {
                self.history.clear();
                self.screen = Screen::fresh_form();
            }
            (action, Screen::Listing { region, sub, .. }) if action.starts_with("page:") => {
                let page = parse_action_index(action)?;
                self.screen = Screen::Listing { region, sub, page };
            }
            (action, Screen::Listing { region, sub, page }) if action.starts_with("detail:") => {
                let item = parse_action_index(action)?;
                self.history.push(self.screen);
                self.screen = Screen::Detail {
                    region,
                    sub,
                    page,
                    item,
                };
            }
            (other, _) => {
                return Err(DriverError::Script(format!(
                    "click on '{other}' has no effect on the current screen"
                )))
            }
        }
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for MockSite {
    async fn open_page(&mut self, _url: &str) -> DriverResult<()> {
        self.ensure_open()?;
        self.root_visits += 1;
        self.history.clear();
        self.screen = Screen::fresh_form();
        Ok(())
    }

    async fn query_all(&mut self, selector: &str) -> DriverResult<Vec<ElementInfo>> {
        self.ensure_open()?;
        self.query(selector)
    }

    async fn click(&mut self, locator: &Locator) -> DriverResult<()> {
        self.ensure_open()?;
        let located = self
            .locate(locator)?
            .ok_or_else(|| DriverError::NotFound {
                selector: locator.to_string(),
            })?;

        if !located.info.is_interactable() {
            return Err(DriverError::NotInteractable {
                selector: locator.to_string(),
                reason: "element is hidden or disabled".to_string(),
            });
        }

        match located.info.attr("data-action").map(str::to_string) {
            Some(action) => self.perform(&action),
            None => Ok(()),
        }
    }

    async fn select(&mut self, selector: &str, value: &str) -> DriverResult<()> {
        self.ensure_open()?;
        let missing_option = || DriverError::NotFound {
            selector: format!("{selector} option[value=\"{value}\"]"),
        };

        let Screen::Form { region, .. } = self.screen else {
            return Err(DriverError::NotFound {
                selector: selector.to_string(),
            });
        };

        if selector == selectors::REGION_SELECT {
            let index = self
                .regions
                .iter()
                .position(|r| r.id == value)
                .ok_or_else(missing_option)?;
            self.screen = Screen::Form {
                region: Some(index),
                sub: None,
                step: FormStep::Choosing,
            };
            Ok(())
        } else if selector == selectors::SUB_REGION_SELECT {
            let region_index = region.ok_or_else(missing_option)?;
            let index = self.regions[region_index]
                .sub_regions
                .iter()
                .position(|s| s.id == value)
                .ok_or_else(missing_option)?;

            if self.crash_on.contains(value) {
                self.closed = true;
                return Err(DriverError::SessionClosed);
            }

            self.screen = Screen::Form {
                region,
                sub: Some(index),
                step: FormStep::Choosing,
            };
            Ok(())
        } else {
            Err(DriverError::NotFound {
                selector: selector.to_string(),
            })
        }
    }

    async fn body_text(&mut self) -> DriverResult<String> {
        self.ensure_open()?;
        if let Screen::Detail {
            region,
            sub,
            page,
            item,
        } = self.screen
        {
            if let Some(item) = self.item(region, sub, page, item) {
                return Ok(item.body_text.clone());
            }
        }
        let document = Html::parse_document(&self.render());
        Ok(document.root_element().text().collect::<Vec<_>>().join(" "))
    }

    async fn inspect(&mut self, locator: &Locator) -> DriverResult<Option<ElementSnapshot>> {
        self.ensure_open()?;
        let Some(located) = self.locate(locator)? else {
            return Ok(None);
        };
        let visible = located.info.visible;
        let bounding_box = if visible {
            BoundingBox {
                width: 120.0,
                height: 32.0,
                bottom: 32.0,
                right: 120.0,
                ..Default::default()
            }
        } else {
            BoundingBox::default()
        };

        Ok(Some(
            ElementSnapshot {
                selector: locator.to_string(),
                outer_html: Some(located.outer_html),
                bounding_box: Some(bounding_box),
                display: Some(if visible { "block" } else { "none" }.to_string()),
                visibility: Some("visible".to_string()),
                opacity: Some("1".to_string()),
            }
            .truncated(),
        ))
    }

    async fn go_back(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        let previous = self
            .history
            .pop()
            .ok_or_else(|| DriverError::Navigation("no previous history entry".to_string()))?;
        self.back_navigations += 1;
        self.screen = previous;
        Ok(())
    }

    async fn reload(&mut self) -> DriverResult<()> {
        self.ensure_open()?;
        if let Screen::Form { .. } = self.screen {
            self.screen = Screen::fresh_form();
        }
        Ok(())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.closed = true;
        Ok(())
    }
}

fn element_info(element: ElementRef<'_>) -> ElementInfo {
    let attributes: HashMap<String, String> = element
        .value()
        .attrs()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    let hidden = attributes.contains_key("hidden")
        || attributes
            .get("style")
            .map(|s| s.replace(' ', "").contains("display:none"))
            .unwrap_or(false);

    let value = match element.value().name() {
        "select" => Some(selected_value(element)),
        "option" | "input" | "button" => attributes.get("value").cloned(),
        _ => None,
    };

    ElementInfo {
        text: element.text().collect::<String>().trim().to_string(),
        inner_html: element.inner_html(),
        value,
        enabled: !attributes.contains_key("disabled"),
        visible: !hidden,
        attributes,
    }
}

fn selected_value(select: ElementRef<'_>) -> String {
    Selector::parse("option[selected]")
        .ok()
        .and_then(|sel| select.select(&sel).next())
        .and_then(|opt| opt.value().attr("value"))
        .unwrap_or_default()
        .to_string()
}

fn option(value: &str, label: &str, selected: bool) -> String {
    let selected = if selected { " selected" } else { "" };
    format!(
        "<option value=\"{}\"{selected}>{}</option>",
        escape(value),
        escape(label)
    )
}

fn parse_action_index(action: &str) -> DriverResult<usize> {
    action
        .split_once(':')
        .and_then(|(_, n)| n.parse().ok())
        .ok_or_else(|| DriverError::Script(format!("malformed action '{action}'")))
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> MockSite {
        MockSite::new(vec![MockRegion::new(
            "PR",
            "Paraná",
            vec![
                MockSubRegion::new("6143", "Curitiba")
                    .with_page(vec![MockItem::new("Casa Centro", "1444400000001")]),
                MockSubRegion::new("6150", "Londrina"),
            ],
        )])
    }

    async fn reach_listing(site: &mut MockSite) {
        site.open_page("http://mock/").await.unwrap();
        site.select(selectors::REGION_SELECT, "PR").await.unwrap();
        site.select(selectors::SUB_REGION_SELECT, "6143").await.unwrap();
        site.click(&Locator::css("#btn_next0")).await.unwrap();
        site.click(&Locator::css("#btn_next1")).await.unwrap();
    }

    #[tokio::test]
    async fn test_form_options_follow_region_selection() {
        let mut site = site();
        site.open_page("http://mock/").await.unwrap();

        let cities = site.query_all("#cmb_cidade option").await.unwrap();
        assert_eq!(cities.len(), 1);

        site.select(selectors::REGION_SELECT, "PR").await.unwrap();
        let cities = site.query_all("#cmb_cidade option").await.unwrap();
        assert_eq!(cities.len(), 3);
        assert_eq!(cities[1].text, "Curitiba");
        assert_eq!(cities[1].value.as_deref(), Some("6143"));

        let region = site.query_all(selectors::REGION_SELECT).await.unwrap();
        assert_eq!(region[0].value.as_deref(), Some("PR"));
    }

    #[tokio::test]
    async fn test_listing_and_detail_navigation() {
        let mut site = site();
        reach_listing(&mut site).await;

        assert_eq!(site.query_all(selectors::LISTING_ITEM).await.unwrap().len(), 1);
        assert_eq!(site.query_all(selectors::PAGINATION_LINK).await.unwrap().len(), 1);

        let link = Locator::css(selectors::LISTING_ITEM).within(selectors::DETAIL_LINK);
        site.click(&link).await.unwrap();
        assert_eq!(site.query_all(selectors::DETAIL_PREVIEW).await.unwrap().len(), 1);
        assert!(site.body_text().await.unwrap().contains("1444400000001"));

        site.go_back().await.unwrap();
        assert_eq!(site.query_all(selectors::LISTING_ITEM).await.unwrap().len(), 1);
        assert_eq!(site.back_navigations(), 1);
    }

    #[tokio::test]
    async fn test_stuck_step_hides_second_button_once() {
        let mut site = site().with_stuck_step("6143", 1);
        site.open_page("http://mock/").await.unwrap();
        site.select(selectors::REGION_SELECT, "PR").await.unwrap();
        site.select(selectors::SUB_REGION_SELECT, "6143").await.unwrap();
        site.click(&Locator::css("#btn_next0")).await.unwrap();

        let err = site.click(&Locator::css("#btn_next1")).await.unwrap_err();
        assert!(matches!(err, DriverError::NotInteractable { .. }));
        let snapshot = site
            .inspect(&Locator::css("#btn_next1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.display.as_deref(), Some("none"));

        reach_listing(&mut site).await;
        assert_eq!(site.query_all(selectors::LISTING_ITEM).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_crash_closes_session() {
        let mut site = site().with_crash_on("6150");
        site.open_page("http://mock/").await.unwrap();
        site.select(selectors::REGION_SELECT, "PR").await.unwrap();

        let err = site.select(selectors::SUB_REGION_SELECT, "6150").await.unwrap_err();
        assert!(matches!(err, DriverError::SessionClosed));
        assert!(matches!(
            site.query_all("body").await,
            Err(DriverError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_reported() {
        let mut site = site();
        site.open_page("http://mock/").await.unwrap();
        let err = site.query_all("ul[[").await.unwrap_err();
        assert!(matches!(err, DriverError::InvalidSelector { .. }));
    }
}
