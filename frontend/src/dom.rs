use crate::ordered_list::Placement;
use crate::post::PostId;

/// The page the timeline renders into.
///
/// Every post element is addressed by its post id. Implementations own the
/// surrounding shell (blog header, status line, post list container).
pub trait PostDom {
    /// Inserts a new post element next to an already placed one.
    fn place(&mut self, id: &PostId, placement: &Placement, markup: &str);

    /// Moves an existing post element.
    fn relocate(&mut self, id: &PostId, placement: &Placement);

    fn replace(&mut self, id: &PostId, markup: &str);

    fn remove(&mut self, id: &PostId);

    /// Switches a wrap-up element between its `open` and `closed` classes.
    fn set_wrapup_open(&mut self, id: &PostId, open: bool);

    fn set_hidden(&mut self, id: &PostId, hidden: bool);

    fn set_status(&mut self, text: &str);

    fn set_blog_header(&mut self, title: &str, description: &str);

    /// Assigns the page's URL fragment again so the browser scrolls to a
    /// post that did not exist when the page first navigated.
    fn reapply_location_hash(&mut self);

    /// Full markup of the rendered page, where the implementation can
    /// produce one.
    fn snapshot(&self) -> Option<String> {
        None
    }
}

pub const STATUS_ID: &str = "liveblog-status";
pub const POST_LIST_ID: &str = "liveblog-post-list";

/// The markup every page implementation mounts: blog header, status line and
/// the post list.
pub fn page_shell(title: &str, description: &str, status: &str, items: &str) -> String {
    format!(
        "<article><h2>{}</h2><p>{}</p></article>\
         <div class=\"live-blog\"><p class=\"update-time\" id=\"{}\">{}</p>\
         <div id=\"liveblog-posts\"><ol id=\"{}\" class=\"liveblog-post-list\">{}</ol></div></div>",
        title, description, STATUS_ID, status, POST_LIST_ID, items
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct MemoryElement {
    pub id: PostId,
    pub markup: String,
    pub hidden: bool,
}

/// In-process page used by the headless embed and by tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryDom {
    elements: Vec<MemoryElement>,
    status: String,
    title: String,
    description: String,
    hash_reapplied: usize,
    mutations: usize,
}

impl MemoryDom {
    pub fn new() -> Self {
        MemoryDom::default()
    }

    pub fn elements(&self) -> &[MemoryElement] {
        &self.elements
    }

    pub fn element(&self, id: &PostId) -> Option<&MemoryElement> {
        self.elements.iter().find(|element| &element.id == id)
    }

    pub fn ids(&self) -> Vec<PostId> {
        self.elements.iter().map(|element| element.id.clone()).collect()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn hash_reapplied(&self) -> usize {
        self.hash_reapplied
    }

    /// Number of structural changes (insert, move, replace, remove).
    pub fn mutations(&self) -> usize {
        self.mutations
    }

    pub fn to_html(&self) -> String {
        let mut items = String::new();
        for element in &self.elements {
            if element.hidden {
                items.push_str(&element.markup.replacen("<li ", "<li hidden ", 1));
            } else {
                items.push_str(&element.markup);
            }
        }

        page_shell(&self.title, &self.description, &self.status, &items)
    }

    fn position(&self, id: &PostId) -> Option<usize> {
        self.elements.iter().position(|element| &element.id == id)
    }

    fn insert_at(&mut self, placement: &Placement, element: MemoryElement) {
        let index = match placement {
            Placement::First => 0,
            Placement::Before(anchor) => self.position(anchor).unwrap_or(0),
            Placement::After(anchor) => self
                .position(anchor)
                .map_or(self.elements.len(), |index| index + 1),
        };
        self.elements.insert(index, element);
    }
}

impl PostDom for MemoryDom {
    fn place(&mut self, id: &PostId, placement: &Placement, markup: &str) {
        self.mutations += 1;
        self.insert_at(
            placement,
            MemoryElement {
                id: id.clone(),
                markup: markup.to_owned(),
                hidden: false,
            },
        );
    }

    fn relocate(&mut self, id: &PostId, placement: &Placement) {
        if let Some(index) = self.position(id) {
            self.mutations += 1;
            let element = self.elements.remove(index);
            self.insert_at(placement, element);
        }
    }

    fn replace(&mut self, id: &PostId, markup: &str) {
        if let Some(index) = self.position(id) {
            self.mutations += 1;
            self.elements[index].markup = markup.to_owned();
        }
    }

    fn remove(&mut self, id: &PostId) {
        if let Some(index) = self.position(id) {
            self.mutations += 1;
            self.elements.remove(index);
        }
    }

    fn set_wrapup_open(&mut self, id: &PostId, open: bool) {
        let (from, to) = if open {
            ("class=\"closed ", "class=\"open ")
        } else {
            ("class=\"open ", "class=\"closed ")
        };
        if let Some(index) = self.position(id) {
            let element = &mut self.elements[index];
            element.markup = element.markup.replacen(from, to, 1);
        }
    }

    fn set_hidden(&mut self, id: &PostId, hidden: bool) {
        if let Some(index) = self.position(id) {
            self.elements[index].hidden = hidden;
        }
    }

    fn set_status(&mut self, text: &str) {
        self.status = text.to_owned();
    }

    fn set_blog_header(&mut self, title: &str, description: &str) {
        self.title = title.to_owned();
        self.description = description.to_owned();
    }

    fn reapply_location_hash(&mut self) {
        self.hash_reapplied += 1;
    }

    fn snapshot(&self) -> Option<String> {
        Some(self.to_html())
    }
}
