//! Remote requests and the typed order parameters that map onto them.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::remote::Params;

/// Authentication endpoint (client credentials grant).
pub const AUTH: &str = "/api/v2/public/auth";
/// Place a buy order.
pub const BUY: &str = "/api/v2/private/buy";
/// Place a sell order.
pub const SELL: &str = "/api/v2/private/sell";
/// Modify an open order.
pub const EDIT: &str = "/api/v2/private/edit";
/// Cancel one order.
pub const CANCEL: &str = "/api/v2/private/cancel";
/// Cancel every open order.
pub const CANCEL_ALL: &str = "/api/v2/private/cancel_all";
/// List open orders.
pub const GET_OPEN_ORDERS: &str = "/api/v2/private/get_open_orders";
/// State of one order.
pub const GET_ORDER_STATE: &str = "/api/v2/private/get_order_state";
/// Public order book snapshot.
pub const GET_ORDER_BOOK: &str = "/api/v2/public/get_order_book";
/// All positions.
pub const GET_POSITIONS: &str = "/api/v2/private/get_positions";
/// One position.
pub const GET_POSITION: &str = "/api/v2/private/get_position";

/// One endpoint invocation: path, parameters, and whether it needs the token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    endpoint: String,
    params: Params,
    authenticated: bool,
}

impl RemoteRequest {
    /// Request against an endpoint that requires the access token.
    #[must_use]
    pub fn private(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Params::new(),
            authenticated: true,
        }
    }

    /// Request against an endpoint that is called without a token.
    #[must_use]
    pub fn public(endpoint: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            ..Self::private(endpoint)
        }
    }

    /// Add a parameter.
    #[must_use]
    pub fn param(mut self, name: &str, value: impl ToString) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    /// Add a parameter only when a value is present.
    #[must_use]
    pub fn param_opt<V: ToString>(self, name: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.param(name, value),
            None => self,
        }
    }

    /// Endpoint path.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Whether the access token is attached.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Cancel every open order.
    #[must_use]
    pub fn cancel_all() -> Self {
        Self::private(CANCEL_ALL)
    }

    /// List open orders.
    #[must_use]
    pub fn open_orders() -> Self {
        Self::private(GET_OPEN_ORDERS)
    }

    /// State of one order.
    #[must_use]
    pub fn order_state(order_id: &str) -> Self {
        Self::private(GET_ORDER_STATE).param("order_id", order_id)
    }

    /// Order book for an instrument (public).
    #[must_use]
    pub fn order_book(instrument_name: &str) -> Self {
        Self::public(GET_ORDER_BOOK).param("instrument_name", instrument_name)
    }

    /// All positions.
    #[must_use]
    pub fn positions() -> Self {
        Self::private(GET_POSITIONS)
    }

    /// Position in one instrument.
    #[must_use]
    pub fn position(instrument_name: &str) -> Self {
        Self::private(GET_POSITION).param("instrument_name", instrument_name)
    }
}

/// Anything the dispatcher can turn into one remote invocation.
pub trait IntoRemoteRequest {
    /// Build the request.
    fn into_request(self) -> RemoteRequest;
}

impl IntoRemoteRequest for RemoteRequest {
    fn into_request(self) -> RemoteRequest {
        self
    }
}

/// Order type accepted by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderType {
    /// Fill at the best available price.
    Market,
    /// Rest at a limit price.
    Limit,
    /// Limit order armed by a trigger.
    StopLimit,
    /// Market order armed by a trigger.
    StopMarket,
}

impl OrderType {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
            Self::StopLimit => "stop_limit",
            Self::StopMarket => "stop_market",
        }
    }

    /// Whether a price parameter is sent with this type.
    #[must_use]
    pub const fn takes_price(&self) -> bool {
        matches!(self, Self::Limit | Self::StopLimit)
    }
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price source that arms a stop order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Index price.
    IndexPrice,
    /// Mark price.
    MarkPrice,
    /// Last traded price.
    LastPrice,
}

impl Trigger {
    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IndexPrice => "index_price",
            Self::MarkPrice => "mark_price",
            Self::LastPrice => "last_price",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Buy order parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyOrder {
    /// Instrument, e.g. `BTC-PERPETUAL`.
    pub instrument_name: String,
    /// Order type.
    pub order_type: OrderType,
    /// Amount in instrument units.
    pub amount: Decimal,
    /// Price; sent only for priced order types.
    pub price: Option<Decimal>,
    /// Free-form label.
    pub label: Option<String>,
}

impl BuyOrder {
    /// Market buy.
    #[must_use]
    pub fn market(instrument_name: impl Into<String>, amount: Decimal) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            order_type: OrderType::Market,
            amount,
            price: None,
            label: None,
        }
    }

    /// Limit buy.
    #[must_use]
    pub fn limit(instrument_name: impl Into<String>, amount: Decimal, price: Decimal) -> Self {
        Self {
            order_type: OrderType::Limit,
            price: Some(price),
            ..Self::market(instrument_name, amount)
        }
    }

    /// Attach a label.
    #[must_use]
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

impl IntoRemoteRequest for BuyOrder {
    fn into_request(self) -> RemoteRequest {
        let price = self.price.filter(|_| self.order_type.takes_price());
        RemoteRequest::private(BUY)
            .param("instrument_name", &self.instrument_name)
            .param("type", self.order_type)
            .param("amount", self.amount)
            .param_opt("price", price)
            .param_opt("label", self.label.filter(|l| !l.is_empty()))
    }
}

/// Sell order parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SellOrder {
    /// Instrument, e.g. `BTC-PERPETUAL`.
    pub instrument_name: String,
    /// Amount in instrument units.
    pub amount: Option<Decimal>,
    /// Amount in contracts.
    pub contracts: Option<Decimal>,
    /// Limit price.
    pub price: Option<Decimal>,
    /// Order type; the exchange default applies when absent.
    pub order_type: Option<OrderType>,
    /// Trigger source for stop orders.
    pub trigger: Option<Trigger>,
    /// Trigger price for stop orders.
    pub trigger_price: Option<Decimal>,
}

impl SellOrder {
    /// Sell order with only the instrument set.
    #[must_use]
    pub fn new(instrument_name: impl Into<String>) -> Self {
        Self {
            instrument_name: instrument_name.into(),
            ..Self::default()
        }
    }

    /// Set the amount.
    #[must_use]
    pub const fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the contract count.
    #[must_use]
    pub const fn contracts(mut self, contracts: Decimal) -> Self {
        self.contracts = Some(contracts);
        self
    }

    /// Set the price.
    #[must_use]
    pub const fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the order type.
    #[must_use]
    pub const fn order_type(mut self, order_type: OrderType) -> Self {
        self.order_type = Some(order_type);
        self
    }

    /// Arm the order on a trigger price.
    #[must_use]
    pub const fn trigger(mut self, trigger: Trigger, trigger_price: Decimal) -> Self {
        self.trigger = Some(trigger);
        self.trigger_price = Some(trigger_price);
        self
    }
}

impl IntoRemoteRequest for SellOrder {
    fn into_request(self) -> RemoteRequest {
        RemoteRequest::private(SELL)
            .param("instrument_name", &self.instrument_name)
            .param_opt("amount", self.amount)
            .param_opt("contracts", self.contracts)
            .param_opt("price", self.price)
            .param_opt("type", self.order_type)
            .param_opt("trigger", self.trigger)
            .param_opt("trigger_price", self.trigger_price)
    }
}

/// Modification of an open order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EditOrder {
    /// Exchange order id.
    pub order_id: String,
    /// New amount.
    pub amount: Option<Decimal>,
    /// New contract count.
    pub contracts: Option<Decimal>,
    /// New price.
    pub price: Option<Decimal>,
    /// Advanced option pricing mode (`usd` or `implv`).
    pub advanced: Option<String>,
    /// Reject instead of taking liquidity.
    pub post_only: Option<bool>,
    /// Only reduce an existing position.
    pub reduce_only: Option<bool>,
}

impl EditOrder {
    /// Edit with only the order id set.
    #[must_use]
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            ..Self::default()
        }
    }

    /// Set the amount.
    #[must_use]
    pub const fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    /// Set the contract count.
    #[must_use]
    pub const fn contracts(mut self, contracts: Decimal) -> Self {
        self.contracts = Some(contracts);
        self
    }

    /// Set the price.
    #[must_use]
    pub const fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    /// Set the advanced pricing mode.
    #[must_use]
    pub fn advanced(mut self, advanced: impl Into<String>) -> Self {
        self.advanced = Some(advanced.into());
        self
    }

    /// Set the post-only flag.
    #[must_use]
    pub const fn post_only(mut self, post_only: bool) -> Self {
        self.post_only = Some(post_only);
        self
    }

    /// Set the reduce-only flag.
    #[must_use]
    pub const fn reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = Some(reduce_only);
        self
    }
}

impl IntoRemoteRequest for EditOrder {
    fn into_request(self) -> RemoteRequest {
        RemoteRequest::private(EDIT)
            .param("order_id", &self.order_id)
            .param_opt("amount", self.amount)
            .param_opt("contracts", self.contracts)
            .param_opt("price", self.price)
            .param_opt("advanced", self.advanced)
            .param_opt("post_only", self.post_only)
            .param_opt("reduce_only", self.reduce_only)
    }
}

/// Cancellation of one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOrder {
    /// Exchange order id.
    pub order_id: String,
}

impl CancelOrder {
    /// Cancel the given order.
    #[must_use]
    pub fn new(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
        }
    }
}

impl IntoRemoteRequest for CancelOrder {
    fn into_request(self) -> RemoteRequest {
        RemoteRequest::private(CANCEL).param("order_id", &self.order_id)
    }
}
