//! The cart: an ordered list of line items, unique by product.
//!
//! All mutation here is pure and synchronous. Stock checks and persistence
//! live in the cart crate, which computes a new [`Cart`] on a copy and only
//! swaps it in once every check has passed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Price, Product, ProductId};

/// Errors raised when a list of line items would break cart invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartInvariantError {
    /// A line item carries a zero amount.
    #[error("line item {0} has a zero amount")]
    ZeroAmount(ProductId),

    /// The same product appears more than once.
    #[error("product {0} appears more than once")]
    DuplicateProduct(ProductId),
}

/// One product entry in the cart with its quantity.
///
/// Serialized flat, as the catalog product plus an `amount` field:
/// `{"id":1,"title":"...","price":"139.9","image":"...","amount":2}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    #[serde(flatten)]
    pub product: Product,
    pub amount: u32,
}

impl LineItem {
    /// A fresh line item holding one unit of `product`.
    #[must_use]
    pub const fn new(product: Product) -> Self {
        Self { product, amount: 1 }
    }

    /// The product this line refers to.
    #[must_use]
    pub const fn product_id(&self) -> ProductId {
        self.product.id
    }

    /// Price of the whole line.
    #[must_use]
    pub fn line_price(&self) -> Price {
        self.product.price * self.amount
    }
}

/// Ordered sequence of line items, unique by product id.
///
/// Deserialization validates the invariants, so a `Cart` read from storage is
/// always well-formed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<LineItem>", into = "Vec<LineItem>")]
pub struct Cart {
    items: Vec<LineItem>,
}

impl Cart {
    /// An empty cart.
    #[must_use]
    pub const fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Build a cart from line items, checking amounts and uniqueness.
    ///
    /// # Errors
    ///
    /// Returns `CartInvariantError` if any amount is zero or a product id
    /// repeats.
    pub fn from_items(items: Vec<LineItem>) -> Result<Self, CartInvariantError> {
        for (index, item) in items.iter().enumerate() {
            if item.amount == 0 {
                return Err(CartInvariantError::ZeroAmount(item.product_id()));
            }
            if items
                .iter()
                .take(index)
                .any(|earlier| earlier.product_id() == item.product_id())
            {
                return Err(CartInvariantError::DuplicateProduct(item.product_id()));
            }
        }
        Ok(Self { items })
    }

    /// Line items in insertion order.
    #[must_use]
    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn iter(&self) -> std::slice::Iter<'_, LineItem> {
        self.items.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Find the line item for a product.
    #[must_use]
    pub fn get(&self, product_id: ProductId) -> Option<&LineItem> {
        self.items
            .iter()
            .find(|item| item.product_id() == product_id)
    }

    #[must_use]
    pub fn contains(&self, product_id: ProductId) -> bool {
        self.get(product_id).is_some()
    }

    /// Units of a product currently held (0 when absent).
    #[must_use]
    pub fn amount_of(&self, product_id: ProductId) -> u32 {
        self.get(product_id).map_or(0, |item| item.amount)
    }

    /// Add one unit of an existing line.
    ///
    /// Returns `false` when the product is absent or its amount is already
    /// `u32::MAX`; the cart is left untouched in both cases.
    pub fn increment(&mut self, product_id: ProductId) -> bool {
        let Some(item) = self.get_mut(product_id) else {
            return false;
        };
        match item.amount.checked_add(1) {
            Some(amount) => {
                item.amount = amount;
                true
            }
            None => false,
        }
    }

    /// Append a new line item at the end.
    ///
    /// # Errors
    ///
    /// Returns `CartInvariantError` if the amount is zero or the product is
    /// already in the cart.
    pub fn push(&mut self, item: LineItem) -> Result<(), CartInvariantError> {
        if item.amount == 0 {
            return Err(CartInvariantError::ZeroAmount(item.product_id()));
        }
        if self.contains(item.product_id()) {
            return Err(CartInvariantError::DuplicateProduct(item.product_id()));
        }
        self.items.push(item);
        Ok(())
    }

    /// Drop a product's line, keeping the order of the others.
    pub fn remove(&mut self, product_id: ProductId) -> Option<LineItem> {
        let index = self
            .items
            .iter()
            .position(|item| item.product_id() == product_id)?;
        Some(self.items.remove(index))
    }

    /// Overwrite the amount of an existing line.
    ///
    /// Returns `false` when the product is absent or `amount` is zero; the
    /// cart is left untouched in both cases.
    pub fn set_amount(&mut self, product_id: ProductId, amount: u32) -> bool {
        if amount == 0 {
            return false;
        }
        match self.get_mut(product_id) {
            Some(item) => {
                item.amount = amount;
                true
            }
            None => false,
        }
    }

    /// Sum of all amounts.
    #[must_use]
    pub fn total_units(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.amount)).sum()
    }

    /// Sum of all line prices.
    #[must_use]
    pub fn subtotal(&self) -> Price {
        self.items.iter().map(LineItem::line_price).sum()
    }

    fn get_mut(&mut self, product_id: ProductId) -> Option<&mut LineItem> {
        self.items
            .iter_mut()
            .find(|item| item.product_id() == product_id)
    }
}

impl TryFrom<Vec<LineItem>> for Cart {
    type Error = CartInvariantError;

    fn try_from(items: Vec<LineItem>) -> Result<Self, Self::Error> {
        Self::from_items(items)
    }
}

impl From<Cart> for Vec<LineItem> {
    fn from(cart: Cart) -> Self {
        cart.items
    }
}

impl<'a> IntoIterator for &'a Cart {
    type Item = &'a LineItem;
    type IntoIter = std::slice::Iter<'a, LineItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}
