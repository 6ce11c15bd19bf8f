//! Core types for the settlement core
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Exact arithmetic (Decimal for money, miles and hours)
//! - Org scoping (every document carries its `org_id`)

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Trip number that matches every trip on an HCR
pub const WILDCARD_TRIP: &str = "*";

// ---------------------------------------------------------------------------
// Pay rules
// ---------------------------------------------------------------------------

/// Who a rate profile pays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileType {
    /// Company driver
    Driver,
    /// Carrier partnership
    Carrier,
}

/// Named pricing policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateProfile {
    /// Profile ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Display name
    pub name: String,
    /// Driver or carrier scope
    pub profile_type: ProfileType,
    /// Soft-deactivation flag
    pub is_active: bool,
    /// Org-wide default for its profile type
    pub is_default: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl RateProfile {
    /// Create an active, non-default profile
    pub fn new(org_id: Uuid, name: impl Into<String>, profile_type: ProfileType) -> Self {
        Self {
            id: Uuid::now_v7(),
            org_id,
            name: name.into(),
            profile_type,
            is_active: true,
            is_default: false,
            created_at: Utc::now(),
        }
    }
}

/// Rule category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleCategory {
    /// Base pay; its threshold selects the distance tier
    Base,
    /// Extra pay for events (stops, waiting, hazmat)
    Accessorial,
    /// Amount withheld from pay
    Deduction,
    /// Template for operator-entered lines, never evaluated
    ManualTemplate,
}

/// Event a rule pays for
///
/// Closed set: adding a kind forces every `match` in the evaluator to handle it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerEvent {
    /// Per loaded mile
    MileLoaded,
    /// Per empty (deadhead) mile
    MileEmpty,
    /// Per hour between leg start and end
    TimeDuration,
    /// Per hour of recorded dwell time
    TimeWaiting,
    /// Per stop on the leg
    CountStops,
    /// Flat amount per load
    FlatLoad,
    /// Flat amount per leg
    FlatLeg,
    /// Flat amount when the load is hazmat
    AttrHazmat,
    /// Flat amount when the load requires a tarp
    AttrTarp,
    /// Percentage of the load's invoice total
    PctOfLoad,
}

impl TriggerEvent {
    /// Wire code
    pub fn code(&self) -> &'static str {
        match self {
            TriggerEvent::MileLoaded => "MILE_LOADED",
            TriggerEvent::MileEmpty => "MILE_EMPTY",
            TriggerEvent::TimeDuration => "TIME_DURATION",
            TriggerEvent::TimeWaiting => "TIME_WAITING",
            TriggerEvent::CountStops => "COUNT_STOPS",
            TriggerEvent::FlatLoad => "FLAT_LOAD",
            TriggerEvent::FlatLeg => "FLAT_LEG",
            TriggerEvent::AttrHazmat => "ATTR_HAZMAT",
            TriggerEvent::AttrTarp => "ATTR_TARP",
            TriggerEvent::PctOfLoad => "PCT_OF_LOAD",
        }
    }

    /// Unit shown on payable descriptions
    pub fn unit(&self) -> &'static str {
        match self {
            TriggerEvent::MileLoaded | TriggerEvent::MileEmpty => "mi",
            TriggerEvent::TimeDuration | TriggerEvent::TimeWaiting => "hr",
            TriggerEvent::CountStops => "stops",
            TriggerEvent::PctOfLoad => "%",
            TriggerEvent::FlatLoad
            | TriggerEvent::FlatLeg
            | TriggerEvent::AttrHazmat
            | TriggerEvent::AttrTarp => "flat",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// One "if trigger then pay" clause of a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateRule {
    /// Rule ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Profile this rule belongs to
    pub profile_id: Uuid,
    /// Display name
    pub name: String,
    /// Category
    pub category: RuleCategory,
    /// Trigger kind
    pub trigger: TriggerEvent,
    /// Rate per unit, flat amount, or percentage (PCT_OF_LOAD)
    pub rate_amount: Decimal,
    /// Quantity below which the rule pays nothing
    pub min_threshold: Option<Decimal>,
    /// Upper bound on the amount
    pub max_cap: Option<Decimal>,
    /// Active flag
    pub is_active: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl RateRule {
    /// Create an active rule without threshold or cap
    pub fn new(
        profile: &RateProfile,
        name: impl Into<String>,
        category: RuleCategory,
        trigger: TriggerEvent,
        rate_amount: Decimal,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            org_id: profile.org_id,
            profile_id: profile.id,
            name: name.into(),
            category,
            trigger,
            rate_amount,
            min_threshold: None,
            max_cap: None,
            is_active: true,
            created_at: Utc::now(),
        }
    }

    /// Set the minimum threshold
    pub fn with_min_threshold(mut self, threshold: Decimal) -> Self {
        self.min_threshold = Some(threshold);
        self
    }

    /// Set the cap
    pub fn with_max_cap(mut self, cap: Decimal) -> Self {
        self.max_cap = Some(cap);
        self
    }
}

/// Kind of party that gets paid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayeeKind {
    /// Company driver
    Driver,
    /// Carrier partnership
    Carrier,
}

impl PayeeKind {
    /// Matching profile type
    pub fn profile_type(&self) -> ProfileType {
        match self {
            PayeeKind::Driver => ProfileType::Driver,
            PayeeKind::Carrier => ProfileType::Carrier,
        }
    }
}

impl fmt::Display for PayeeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayeeKind::Driver => write!(f, "driver"),
            PayeeKind::Carrier => write!(f, "carrier"),
        }
    }
}

/// Party that gets paid: a driver or a carrier partnership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaySubject {
    /// Driver ID
    Driver(Uuid),
    /// Carrier partnership ID
    Carrier(Uuid),
}

impl PaySubject {
    /// Subject kind
    pub fn kind(&self) -> PayeeKind {
        match self {
            PaySubject::Driver(_) => PayeeKind::Driver,
            PaySubject::Carrier(_) => PayeeKind::Carrier,
        }
    }

    /// Subject ID
    pub fn id(&self) -> Uuid {
        match self {
            PaySubject::Driver(id) | PaySubject::Carrier(id) => *id,
        }
    }
}

impl fmt::Display for PaySubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind(), self.id())
    }
}

/// Link between a subject and one of its rate profiles
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileAssignment {
    /// Assignment ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Driver or carrier partnership
    pub subject: PaySubject,
    /// Assigned profile
    pub profile_id: Uuid,
    /// Exactly one assignment per subject holds the default
    pub is_default: bool,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

/// Partnership with an outside carrier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierPartnership {
    /// Partnership ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Carrier display name
    pub carrier_name: String,
    /// Inactive partnerships cannot be dispatched or paid
    pub is_active: bool,
}

// ---------------------------------------------------------------------------
// Lanes
// ---------------------------------------------------------------------------

/// How a lane prices a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RateType {
    /// rate × miles
    PerMile,
    /// rate
    FlatRate,
    /// rate × stops
    PerStop,
}

/// How a lane charges fuel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FuelSurchargeType {
    /// Percentage of the freight base
    Percentage,
    /// Fixed amount
    Flat,
}

/// Negotiated price for an (org, HCR, trip) route
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractLane {
    /// Lane ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Highway contract route
    pub hcr: String,
    /// Trip number, or `*` for every trip
    pub trip_number: String,
    /// Billed customer
    pub customer_id: Option<Uuid>,
    /// Contract rate
    pub rate: Decimal,
    /// How `rate` applies
    pub rate_type: RateType,
    /// Fuel surcharge mode, none when the lane carries no surcharge
    pub fuel_surcharge_type: Option<FuelSurchargeType>,
    /// Percentage or flat amount, per `fuel_surcharge_type`
    pub fuel_surcharge_value: Decimal,
    /// Charge per stop beyond `included_stops`
    pub stop_off_rate: Decimal,
    /// Stops covered by the base rate
    pub included_stops: u32,
    /// Contracted miles, used when a load has no effective miles
    pub contract_miles: Option<Decimal>,
    /// First day the lane applies
    pub effective_from: Option<NaiveDate>,
    /// Last day the lane applies
    pub effective_to: Option<NaiveDate>,
    /// Active flag
    pub is_active: bool,
    /// Last time an import matched this lane
    pub last_import_match_at: Option<DateTime<Utc>>,
    /// Number of import matches
    pub import_match_count: u64,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl ContractLane {
    /// Create an active per-mile lane without surcharges
    pub fn new(
        org_id: Uuid,
        hcr: impl Into<String>,
        trip_number: impl Into<String>,
        rate: Decimal,
        rate_type: RateType,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            org_id,
            hcr: hcr.into(),
            trip_number: trip_number.into(),
            customer_id: None,
            rate,
            rate_type,
            fuel_surcharge_type: None,
            fuel_surcharge_value: Decimal::ZERO,
            stop_off_rate: Decimal::ZERO,
            included_stops: 0,
            contract_miles: None,
            effective_from: None,
            effective_to: None,
            is_active: true,
            last_import_match_at: None,
            import_match_count: 0,
            created_at: Utc::now(),
        }
    }

    /// Trip number is the wildcard
    pub fn is_wildcard(&self) -> bool {
        self.trip_number.trim() == WILDCARD_TRIP
    }

    /// Lane is in effect on `date`; an unknown date is always covered
    pub fn covers_date(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return true;
        };
        if let Some(from) = self.effective_from {
            if date < from {
                return false;
            }
        }
        if let Some(to) = self.effective_to {
            if date > to {
                return false;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Loads
// ---------------------------------------------------------------------------

/// Contract classification of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadType {
    /// No lane matched yet (quarantined)
    Unmapped,
    /// Exact lane match
    Contract,
    /// Wildcard lane match, needs review
    Spot,
}

impl LoadType {
    /// Only UNMAPPED → CONTRACT and UNMAPPED → SPOT are valid
    pub fn can_transition_to(&self, next: LoadType) -> bool {
        matches!(
            (self, next),
            (LoadType::Unmapped, LoadType::Contract) | (LoadType::Unmapped, LoadType::Spot)
        )
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadType::Unmapped => "UNMAPPED",
            LoadType::Contract => "CONTRACT",
            LoadType::Spot => "SPOT",
        };
        write!(f, "{}", s)
    }
}

/// Workflow status of a load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LoadStatus {
    /// Created, no driver or carrier yet
    Pending,
    /// Driver or carrier assigned
    Assigned,
    /// Dispatched
    Dispatched,
    /// Under way
    InTransit,
    /// Delivered
    Delivered,
    /// Paperwork complete
    Completed,
    /// Cancelled
    Cancelled,
}

impl LoadStatus {
    /// Every status
    pub const ALL: [LoadStatus; 7] = [
        LoadStatus::Pending,
        LoadStatus::Assigned,
        LoadStatus::Dispatched,
        LoadStatus::InTransit,
        LoadStatus::Delivered,
        LoadStatus::Completed,
        LoadStatus::Cancelled,
    ];

    /// Map a free-form external status onto the workflow
    pub fn from_external(status: &str) -> Option<Self> {
        let normalized = status
            .trim()
            .to_ascii_lowercase()
            .replace(|c: char| c == '-' || c == ' ', "_");
        match normalized.as_str() {
            "pending" | "new" | "created" | "tendered" => Some(LoadStatus::Pending),
            "assigned" | "accepted" => Some(LoadStatus::Assigned),
            "dispatched" => Some(LoadStatus::Dispatched),
            "in_transit" | "en_route" | "started" => Some(LoadStatus::InTransit),
            "delivered" | "arrived" => Some(LoadStatus::Delivered),
            "completed" | "closed" => Some(LoadStatus::Completed),
            "cancelled" | "canceled" => Some(LoadStatus::Cancelled),
            _ => None,
        }
    }
}

/// Shipment to be transported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Load {
    /// Load ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Human-facing load number
    pub load_number: String,
    /// Shipment ID in the external source
    pub external_id: Option<String>,
    /// Contract classification
    pub load_type: LoadType,
    /// Workflow status
    pub status: LoadStatus,
    /// HCR parsed from the shipment
    pub parsed_hcr: Option<String>,
    /// Trip number parsed from the shipment
    pub parsed_trip_number: Option<String>,
    /// Measured miles
    pub effective_miles: Option<Decimal>,
    /// Contracted miles
    pub contract_miles: Option<Decimal>,
    /// Hazardous materials
    pub is_hazmat: bool,
    /// Tarp required
    pub requires_tarp: bool,
    /// Wildcard match awaiting operator review
    pub requires_manual_review: bool,
    /// Position tracking enabled
    pub gps_tracking_enabled: bool,
    /// Matched lane
    pub contract_lane_id: Option<Uuid>,
    /// Exact lane found for a SPOT load after classification
    pub suggested_lane_id: Option<Uuid>,
    /// Cache of leg 1's driver
    pub primary_driver_id: Option<Uuid>,
    /// Cache of leg 1's carrier partnership
    pub primary_carrier_id: Option<Uuid>,
    /// External "last updated" marker used for change detection
    pub external_updated_at: Option<String>,
    /// Weight (lbs)
    pub weight: Option<Decimal>,
    /// Commodity description
    pub commodity: Option<String>,
    /// Scheduled pickup date, used for lane date ranges
    pub pickup_date: Option<NaiveDate>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Load {
    /// Create a pending, unmapped load
    pub fn new(org_id: Uuid, load_number: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            org_id,
            load_number: load_number.into(),
            external_id: None,
            load_type: LoadType::Unmapped,
            status: LoadStatus::Pending,
            parsed_hcr: None,
            parsed_trip_number: None,
            effective_miles: None,
            contract_miles: None,
            is_hazmat: false,
            requires_tarp: false,
            requires_manual_review: false,
            gps_tracking_enabled: false,
            contract_lane_id: None,
            suggested_lane_id: None,
            primary_driver_id: None,
            primary_carrier_id: None,
            external_updated_at: None,
            weight: None,
            commodity: None,
            pickup_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Cached primary subject
    pub fn primary_subject(&self) -> Option<PaySubject> {
        self.primary_driver_id
            .map(PaySubject::Driver)
            .or_else(|| self.primary_carrier_id.map(PaySubject::Carrier))
    }

    /// Point the primary-subject cache at `subject`.
    ///
    /// Clears both fields before setting one so the cache never names a driver
    /// and a carrier at once. Returns whether anything changed.
    pub fn set_primary_subject(&mut self, subject: Option<PaySubject>) -> bool {
        if self.primary_subject() == subject {
            return false;
        }
        self.primary_driver_id = None;
        self.primary_carrier_id = None;
        match subject {
            Some(PaySubject::Driver(id)) => self.primary_driver_id = Some(id),
            Some(PaySubject::Carrier(id)) => self.primary_carrier_id = Some(id),
            None => {}
        }
        self.updated_at = Utc::now();
        true
    }
}

/// Stop role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StopType {
    /// Pickup
    Pickup,
    /// Delivery
    Delivery,
}

/// Stop on a load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    /// Stop ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Load this stop belongs to
    pub load_id: Uuid,
    /// Position on the load (1-based)
    pub sequence: u32,
    /// Role
    pub stop_type: StopType,
    /// Location name or address
    pub location: String,
    /// Scheduled window start
    pub window_start: Option<DateTime<Utc>>,
    /// Scheduled window end
    pub window_end: Option<DateTime<Utc>>,
    /// Actual arrival
    pub check_in_at: Option<DateTime<Utc>>,
    /// Actual departure
    pub check_out_at: Option<DateTime<Utc>>,
    /// Recorded dwell time in minutes
    pub dwell_minutes: Decimal,
}

impl Stop {
    /// Create a stop with no times recorded
    pub fn new(load: &Load, sequence: u32, stop_type: StopType, location: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            org_id: load.org_id,
            load_id: load.id,
            sequence,
            stop_type,
            location: location.into(),
            window_start: None,
            window_end: None,
            check_in_at: None,
            check_out_at: None,
            dwell_minutes: Decimal::ZERO,
        }
    }
}

/// Leg status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LegStatus {
    /// Planned, nobody assigned
    Planned,
    /// Driver or carrier assigned
    Assigned,
    /// Under way
    InProgress,
    /// Finished
    Completed,
    /// Cancelled
    Cancelled,
}

/// Driver- or carrier-assigned segment of a load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchLeg {
    /// Leg ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Load this leg belongs to
    pub load_id: Uuid,
    /// Position on the load (1 = first leg)
    pub sequence: u32,
    /// Assigned driver
    pub driver_id: Option<Uuid>,
    /// Assigned carrier partnership
    pub carrier_partnership_id: Option<Uuid>,
    /// Loaded miles
    pub leg_loaded_miles: Decimal,
    /// Empty miles
    pub leg_empty_miles: Decimal,
    /// First stop sequence covered by the leg
    pub start_stop_sequence: u32,
    /// Last stop sequence covered by the leg
    pub end_stop_sequence: u32,
    /// Status
    pub status: LegStatus,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl DispatchLeg {
    /// Create a planned leg covering stops `start..=end`
    pub fn new(load: &Load, sequence: u32, start_stop_sequence: u32, end_stop_sequence: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            org_id: load.org_id,
            load_id: load.id,
            sequence,
            driver_id: None,
            carrier_partnership_id: None,
            leg_loaded_miles: Decimal::ZERO,
            leg_empty_miles: Decimal::ZERO,
            start_stop_sequence,
            end_stop_sequence,
            status: LegStatus::Planned,
            created_at: now,
            updated_at: now,
        }
    }

    /// Assigned subject of the given kind
    pub fn subject(&self, kind: PayeeKind) -> Option<PaySubject> {
        match kind {
            PayeeKind::Driver => self.driver_id.map(PaySubject::Driver),
            PayeeKind::Carrier => self.carrier_partnership_id.map(PaySubject::Carrier),
        }
    }

    /// Any assigned subject, driver first
    pub fn any_subject(&self) -> Option<PaySubject> {
        self.subject(PayeeKind::Driver)
            .or_else(|| self.subject(PayeeKind::Carrier))
    }

    /// First leg of its load
    pub fn is_first_leg(&self) -> bool {
        self.sequence <= 1
    }

    /// Stop sequence falls inside the leg
    pub fn covers_stop(&self, sequence: u32) -> bool {
        sequence >= self.start_stop_sequence && sequence <= self.end_stop_sequence
    }
}

// ---------------------------------------------------------------------------
// Payables
// ---------------------------------------------------------------------------

/// Origin of a payable line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayableSource {
    /// Engine generated, replaced on every recalculation unless locked
    System,
    /// Operator entered, never touched by the engine
    Manual,
}

/// One compensation line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadPayable {
    /// Line ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Load
    pub load_id: Uuid,
    /// Leg
    pub leg_id: Uuid,
    /// Who is paid
    pub payee: PaySubject,
    /// Origin
    pub source: PayableSource,
    /// Locked lines survive recalculation
    pub is_locked: bool,
    /// Rule that produced the line
    pub rule_id: Option<Uuid>,
    /// Description
    pub description: String,
    /// Quantity
    pub quantity: Decimal,
    /// Rate
    pub rate: Decimal,
    /// Line total (negative for deductions)
    pub total_amount: Decimal,
    /// Warning surfaced to the operator
    pub warning_message: Option<String>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
}

impl LoadPayable {
    /// Line is owned by the engine (SYSTEM and unlocked)
    pub fn is_engine_owned(&self) -> bool {
        self.source == PayableSource::System && !self.is_locked
    }
}

// ---------------------------------------------------------------------------
// Invoices
// ---------------------------------------------------------------------------

/// Invoice lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvoiceStatus {
    /// Load is unmapped, no lane to bill from
    MissingData,
    /// Amounts computed on read
    Draft,
    /// Sent to the customer; amounts frozen
    Billed,
    /// Awaiting payment
    PendingPayment,
    /// Paid
    Paid,
    /// Voided
    Void,
}

impl InvoiceStatus {
    /// Every status
    pub const ALL: [InvoiceStatus; 6] = [
        InvoiceStatus::MissingData,
        InvoiceStatus::Draft,
        InvoiceStatus::Billed,
        InvoiceStatus::PendingPayment,
        InvoiceStatus::Paid,
        InvoiceStatus::Void,
    ];

    /// Amounts are a stored snapshot and never recomputed
    pub fn is_frozen(&self) -> bool {
        matches!(
            self,
            InvoiceStatus::Billed | InvoiceStatus::PendingPayment | InvoiceStatus::Paid
        )
    }

    /// Allowed lifecycle edges
    pub fn can_transition_to(&self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        match (self, next) {
            (MissingData, Draft) => true,
            (Draft, Billed) => true,
            (Billed, PendingPayment) => true,
            (Billed, Paid) | (PendingPayment, Paid) => true,
            (Paid, Void) => false,
            (Void, _) => false,
            (_, Void) => true,
            _ => false,
        }
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InvoiceStatus::MissingData => "MISSING_DATA",
            InvoiceStatus::Draft => "DRAFT",
            InvoiceStatus::Billed => "BILLED",
            InvoiceStatus::PendingPayment => "PENDING_PAYMENT",
            InvoiceStatus::Paid => "PAID",
            InvoiceStatus::Void => "VOID",
        };
        write!(f, "{}", s)
    }
}

/// Customer-facing bill for a load
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Billed load
    pub load_id: Uuid,
    /// Human-facing number
    pub invoice_number: String,
    /// Status
    pub status: InvoiceStatus,
    /// Lane the amounts are computed from
    pub contract_lane_id: Option<Uuid>,
    /// Stored freight subtotal
    pub subtotal: Decimal,
    /// Stored fuel surcharge
    pub fuel_surcharge: Decimal,
    /// Stored accessorials
    pub accessorials_total: Decimal,
    /// Pass-through tax
    pub tax_amount: Decimal,
    /// Stored total
    pub total_amount: Decimal,
    /// Billed timestamp
    pub billed_at: Option<DateTime<Utc>>,
    /// Paid timestamp
    pub paid_at: Option<DateTime<Utc>>,
    /// Voided timestamp
    pub voided_at: Option<DateTime<Utc>>,
    /// Created timestamp
    pub created_at: DateTime<Utc>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Create a zero-amount invoice for `load`
    pub fn new(load: &Load, status: InvoiceStatus) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            org_id: load.org_id,
            load_id: load.id,
            invoice_number: format!("INV-{}", load.load_number),
            status,
            contract_lane_id: load.contract_lane_id,
            subtotal: Decimal::ZERO,
            fuel_surcharge: Decimal::ZERO,
            accessorials_total: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            billed_at: None,
            paid_at: None,
            voided_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Invoice line kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LineItemType {
    /// Freight base
    Freight,
    /// Fuel surcharge
    Fuel,
    /// Stop-off and other accessorials
    Accessorial,
    /// Tax
    Tax,
}

/// Invoice detail line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceLineItem {
    /// Line ID
    pub id: Uuid,
    /// Owning organization
    pub org_id: Uuid,
    /// Invoice
    pub invoice_id: Uuid,
    /// Kind
    pub item_type: LineItemType,
    /// Description
    pub description: String,
    /// Quantity
    pub quantity: Decimal,
    /// Rate
    pub rate: Decimal,
    /// Amount
    pub amount: Decimal,
}

// ---------------------------------------------------------------------------
// Aggregates and job state
// ---------------------------------------------------------------------------

/// Per-organization status counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrgStats {
    /// Organization
    pub org_id: Uuid,
    /// Loads per workflow status
    pub load_counts: BTreeMap<LoadStatus, i64>,
    /// Invoices per status
    pub invoice_counts: BTreeMap<InvoiceStatus, i64>,
    /// Last drift repair
    pub last_repaired_at: Option<DateTime<Utc>>,
}

impl OrgStats {
    /// Empty counters for `org_id`
    pub fn new(org_id: Uuid) -> Self {
        Self {
            org_id,
            ..Default::default()
        }
    }
}

/// Continuation point of a reconciliation job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncCursor {
    /// Organization (document key)
    pub org_id: Uuid,
    /// Lower bound of the window being drained
    pub since: DateTime<Utc>,
    /// Source page cursor to resume from
    pub cursor: Option<String>,
    /// Updated timestamp
    pub updated_at: DateTime<Utc>,
}
