use super::*;
use crate::error::ModelError;

/// Owns a [`Document`] while it is being created or edited.
///
/// Every mutation marks the builder dirty; [`DocumentBuilder::build`] then
/// renumbers pages and bumps `version` and `updated_at` exactly once.
#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    document: Document,
    dirty: bool,
}

impl DocumentBuilder {
    /// Start an empty document at version 0. The first `build` makes it 1.
    pub fn new(title: &str, theme: &str, format: PageFormat, orientation: Orientation) -> Self {
        let now = Utc::now();
        Self {
            document: Document {
                id: new_id(),
                title: title.to_string(),
                author: None,
                pages: Vec::new(),
                theme: theme.to_string(),
                page_format: format,
                orientation,
                version: 0,
                created_at: now,
                updated_at: now,
            },
            dirty: true,
        }
    }

    /// Edit an existing document.
    pub fn edit(document: Document) -> Self {
        Self {
            document,
            dirty: false,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn set_author(&mut self, author: Option<String>) -> &mut Self {
        self.document.author = author;
        self.dirty = true;
        self
    }

    pub fn set_theme(&mut self, theme: &str) -> &mut Self {
        self.document.theme = theme.to_string();
        self.dirty = true;
        self
    }

    // ── Pages ──────────────────────────────────────────────────

    /// Append a page with the document's format and the given margins.
    /// Returns the new page id.
    pub fn add_page(&mut self, kind: PageKind, margins: Margins) -> String {
        let index = self.document.pages.len();
        self.insert_page_at(index, kind, margins)
    }

    /// Append a page that has already been laid out. Blocks with a
    /// non-positive size are dropped with a warning.
    pub fn push_page(
        &mut self,
        kind: PageKind,
        margins: Margins,
        background: Option<PageBackground>,
        blocks: Vec<PositionedBlock>,
    ) -> String {
        let blocks = blocks
            .into_iter()
            .filter(|b| match validate_size(b.position.width, b.position.height) {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("dropping {} block {}: {}", b.kind(), b.id, e);
                    false
                }
            })
            .collect();
        let page = Page {
            id: new_id(),
            index: self.document.pages.len() + 1,
            kind,
            format: self.document.page_format,
            orientation: self.document.orientation,
            blocks,
            background,
            margins,
        };
        let id = page.id.clone();
        self.document.pages.push(page);
        self.dirty = true;
        id
    }

    /// Insert a page at a 0-based position (clamped to the page count).
    pub fn insert_page_at(&mut self, position: usize, kind: PageKind, margins: Margins) -> String {
        let page = Page {
            id: new_id(),
            index: 0,
            kind,
            format: self.document.page_format,
            orientation: self.document.orientation,
            blocks: Vec::new(),
            background: None,
            margins,
        };
        let id = page.id.clone();
        let position = position.min(self.document.pages.len());
        self.document.pages.insert(position, page);
        self.renumber();
        id
    }

    pub fn page_mut(&mut self, page_id: &str) -> Result<&mut Page, ModelError> {
        self.dirty = true;
        self.document
            .pages
            .iter_mut()
            .find(|p| p.id == page_id)
            .ok_or_else(|| ModelError::PageNotFound(page_id.to_string()))
    }

    pub fn set_background(
        &mut self,
        page_id: &str,
        background: Option<PageBackground>,
    ) -> Result<(), ModelError> {
        self.page_mut(page_id)?.background = background;
        Ok(())
    }

    pub fn remove_page(&mut self, page_id: &str) -> Result<Page, ModelError> {
        let pos = self.page_position(page_id)?;
        let page = self.document.pages.remove(pos);
        self.renumber();
        Ok(page)
    }

    /// Copy a page, with fresh page and block ids, directly after the
    /// original. Returns the new page id.
    pub fn duplicate_page(&mut self, page_id: &str) -> Result<String, ModelError> {
        let pos = self.page_position(page_id)?;
        let mut copy = self.document.pages[pos].clone();
        copy.id = new_id();
        for block in &mut copy.blocks {
            block.id = new_id();
        }
        let id = copy.id.clone();
        self.document.pages.insert(pos + 1, copy);
        self.renumber();
        Ok(id)
    }

    /// Move a page to a 0-based position (clamped).
    pub fn move_page(&mut self, page_id: &str, to: usize) -> Result<(), ModelError> {
        let from = self.page_position(page_id)?;
        let page = self.document.pages.remove(from);
        let to = to.min(self.document.pages.len());
        self.document.pages.insert(to, page);
        self.renumber();
        Ok(())
    }

    /// Reassign 1-based contiguous indices in list order.
    pub fn renumber(&mut self) {
        for (i, page) in self.document.pages.iter_mut().enumerate() {
            page.index = i + 1;
        }
        self.dirty = true;
    }

    fn page_position(&self, page_id: &str) -> Result<usize, ModelError> {
        self.document
            .pages
            .iter()
            .position(|p| p.id == page_id)
            .ok_or_else(|| ModelError::PageNotFound(page_id.to_string()))
    }

    // ── Blocks ─────────────────────────────────────────────────

    /// Append a block to a page. Returns the block id.
    pub fn add_block(
        &mut self,
        page_id: &str,
        block: PositionedBlock,
    ) -> Result<String, ModelError> {
        validate_size(block.position.width, block.position.height)?;
        let id = block.id.clone();
        self.page_mut(page_id)?.blocks.push(block);
        Ok(id)
    }

    pub fn remove_block(
        &mut self,
        page_id: &str,
        block_id: &str,
    ) -> Result<PositionedBlock, ModelError> {
        let page = self.page_mut(page_id)?;
        let pos = page
            .blocks
            .iter()
            .position(|b| b.id == block_id)
            .ok_or_else(|| ModelError::BlockNotFound(block_id.to_string()))?;
        Ok(page.blocks.remove(pos))
    }

    pub fn move_block(
        &mut self,
        page_id: &str,
        block_id: &str,
        x: f64,
        y: f64,
    ) -> Result<(), ModelError> {
        let block = self.block_mut(page_id, block_id)?;
        block.position.x = x;
        block.position.y = y;
        Ok(())
    }

    pub fn resize_block(
        &mut self,
        page_id: &str,
        block_id: &str,
        width: f64,
        height: f64,
    ) -> Result<(), ModelError> {
        validate_size(width, height)?;
        let block = self.block_mut(page_id, block_id)?;
        block.position.width = width;
        block.position.height = height;
        Ok(())
    }

    pub fn update_block_style(
        &mut self,
        page_id: &str,
        block_id: &str,
        style: BlockStyle,
    ) -> Result<(), ModelError> {
        self.block_mut(page_id, block_id)?.style = style;
        Ok(())
    }

    /// Move a block to another page, keeping its position.
    pub fn transfer_block(
        &mut self,
        from_page: &str,
        block_id: &str,
        to_page: &str,
    ) -> Result<(), ModelError> {
        // Check the target first so a failed transfer leaves the block in place.
        self.page_position(to_page)?;
        let block = self.remove_block(from_page, block_id)?;
        self.page_mut(to_page)?.blocks.push(block);
        Ok(())
    }

    fn block_mut(
        &mut self,
        page_id: &str,
        block_id: &str,
    ) -> Result<&mut PositionedBlock, ModelError> {
        self.page_mut(page_id)?
            .blocks
            .iter_mut()
            .find(|b| b.id == block_id)
            .ok_or_else(|| ModelError::BlockNotFound(block_id.to_string()))
    }

    // ── Format ─────────────────────────────────────────────────

    /// Switch every page to a new format. With `rescale`, millimetre geometry
    /// (blocks and margins) is scaled per axis so blocks keep their relative
    /// place; percent geometry is already relative and stays as is. Without
    /// it only the format and orientation change.
    pub fn change_format(&mut self, format: PageFormat, orientation: Orientation, rescale: bool) {
        let (new_w, new_h) = format.dimensions_mm(orientation);
        for page in &mut self.document.pages {
            if rescale {
                let (old_w, old_h) = page.size_mm();
                let sx = if old_w > 0.0 { new_w / old_w } else { 1.0 };
                let sy = if old_h > 0.0 { new_h / old_h } else { 1.0 };
                scale_page(page, sx, sy);
            }
            page.format = format;
            page.orientation = orientation;
        }
        self.document.page_format = format;
        self.document.orientation = orientation;
        self.dirty = true;
    }

    /// Finish editing. Renumbers pages and, if anything changed, bumps the
    /// version and `updated_at`.
    pub fn build(mut self) -> Document {
        for (i, page) in self.document.pages.iter_mut().enumerate() {
            page.index = i + 1;
        }
        if self.dirty {
            self.document.version += 1;
            self.document.updated_at = Utc::now();
        }
        self.document
    }
}

fn validate_size(width: f64, height: f64) -> Result<(), ModelError> {
    if !(width.is_finite() && height.is_finite()) || width <= 0.0 || height <= 0.0 {
        return Err(ModelError::InvalidGeometry(format!(
            "block size must be positive, got {}x{}",
            width, height
        )));
    }
    Ok(())
}

fn scale_page(page: &mut Page, sx: f64, sy: f64) {
    for block in &mut page.blocks {
        if block.position.unit == Unit::Mm {
            block.position.x *= sx;
            block.position.width *= sx;
            block.position.y *= sy;
            block.position.height *= sy;
        }
    }
    page.margins = Margins {
        top: page.margins.top * sy,
        bottom: page.margins.bottom * sy,
        left: page.margins.left * sx,
        right: page.margins.right * sx,
    };
}
