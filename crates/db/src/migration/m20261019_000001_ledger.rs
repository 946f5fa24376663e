//! Ledger schema.
//!
//! Creates the enum types, the entity/entry/document tables and the unique
//! index that keeps document-sourced entries single per
//! `(source_document_id, source_line_no, kind)`.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        // ============================================================
        // PART 1: ENUMS
        // ============================================================
        db.execute_unprepared(ENUMS_SQL).await?;

        // ============================================================
        // PART 2: OWNING ENTITIES
        // ============================================================
        db.execute_unprepared(LEDGER_ENTITIES_SQL).await?;

        // ============================================================
        // PART 3: SOURCE DOCUMENTS
        // ============================================================
        db.execute_unprepared(SOURCE_DOCUMENTS_SQL).await?;
        db.execute_unprepared(DOCUMENT_LINES_SQL).await?;

        // ============================================================
        // PART 4: LEDGER
        // ============================================================
        db.execute_unprepared(LEDGER_ENTRIES_SQL).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(DROP_SQL)
            .await?;
        Ok(())
    }
}

const ENUMS_SQL: &str = r"
CREATE TYPE entity_kind AS ENUM ('stock_unit', 'account');

CREATE TYPE entry_kind AS ENUM (
    'opening',
    'purchase',
    'purchase_return',
    'damage',
    'adjustment_in',
    'adjustment_out',
    'payment',
    'manual',
    'reversal'
);

CREATE TYPE document_kind AS ENUM (
    'purchase',
    'purchase_return',
    'damage',
    'adjustment',
    'payment'
);

CREATE TYPE document_status AS ENUM ('pending', 'approved', 'voided', 'rejected');
";

const LEDGER_ENTITIES_SQL: &str = r"
CREATE TABLE ledger_entities (
    id UUID PRIMARY KEY,
    kind entity_kind NOT NULL,
    name VARCHAR(255) NOT NULL,
    balance NUMERIC NOT NULL DEFAULT 0,
    secondary_balance NUMERIC NOT NULL DEFAULT 0,
    reorder_level NUMERIC NOT NULL DEFAULT 0,
    unit_cost NUMERIC NOT NULL DEFAULT 0,
    lifetime_increase NUMERIC NOT NULL DEFAULT 0,
    lifetime_decrease NUMERIC NOT NULL DEFAULT 0,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_stock_not_negative CHECK (kind <> 'stock_unit' OR balance >= 0),
    CONSTRAINT chk_secondary_not_negative CHECK (secondary_balance >= 0),
    CONSTRAINT chk_name_not_blank CHECK (length(trim(name)) > 0)
);

CREATE INDEX idx_ledger_entities_kind ON ledger_entities(kind, name);
";

const SOURCE_DOCUMENTS_SQL: &str = r"
CREATE TABLE source_documents (
    id UUID PRIMARY KEY,
    kind document_kind NOT NULL,
    status document_status NOT NULL DEFAULT 'pending',
    counterparty_id UUID REFERENCES ledger_entities(id),
    reference VARCHAR(255) NOT NULL,
    created_by UUID,
    approved_by UUID,
    approved_at TIMESTAMPTZ,
    voided_at TIMESTAMPTZ,
    void_reason TEXT,
    rejected_at TIMESTAMPTZ,
    rejection_reason TEXT,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    CONSTRAINT chk_approved_has_approval CHECK (
        status NOT IN ('approved', 'voided') OR approved_at IS NOT NULL
    ),
    CONSTRAINT chk_voided_has_reason CHECK (
        status <> 'voided' OR (voided_at IS NOT NULL AND void_reason IS NOT NULL)
    )
);

CREATE INDEX idx_source_documents_status ON source_documents(status, created_at);
";

const DOCUMENT_LINES_SQL: &str = r"
CREATE TABLE document_lines (
    document_id UUID NOT NULL REFERENCES source_documents(id) ON DELETE CASCADE,
    line_no INTEGER NOT NULL,
    entity_id UUID NOT NULL REFERENCES ledger_entities(id),
    quantity NUMERIC NOT NULL,
    decrease_quantity NUMERIC NOT NULL DEFAULT 0,
    unit_cost NUMERIC,
    PRIMARY KEY (document_id, line_no),
    CONSTRAINT chk_line_no_positive CHECK (line_no > 0),
    CONSTRAINT chk_magnitudes_not_negative CHECK (quantity >= 0 AND decrease_quantity >= 0),
    CONSTRAINT chk_unit_cost_not_negative CHECK (unit_cost IS NULL OR unit_cost >= 0)
);
";

const LEDGER_ENTRIES_SQL: &str = r"
CREATE TABLE ledger_entries (
    id UUID PRIMARY KEY,
    entity_id UUID NOT NULL REFERENCES ledger_entities(id),
    kind entry_kind NOT NULL,
    increase NUMERIC NOT NULL DEFAULT 0,
    decrease NUMERIC NOT NULL DEFAULT 0,
    secondary_increase NUMERIC NOT NULL DEFAULT 0,
    secondary_decrease NUMERIC NOT NULL DEFAULT 0,
    source_document_id UUID REFERENCES source_documents(id),
    source_line_no INTEGER,
    description VARCHAR(500) NOT NULL DEFAULT '',
    balance_before NUMERIC NOT NULL,
    running_balance NUMERIC NOT NULL,
    secondary_running_balance NUMERIC NOT NULL DEFAULT 0,
    occurred_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
    sequence BIGSERIAL NOT NULL,
    CONSTRAINT chk_magnitudes_not_negative CHECK (
        increase >= 0 AND decrease >= 0
        AND secondary_increase >= 0 AND secondary_decrease >= 0
    ),
    CONSTRAINT chk_source_complete CHECK (
        (source_document_id IS NULL) = (source_line_no IS NULL)
    )
);

CREATE UNIQUE INDEX uq_ledger_entries_source
    ON ledger_entries(source_document_id, source_line_no, kind)
    WHERE source_document_id IS NOT NULL;

CREATE INDEX idx_ledger_entries_entity_order
    ON ledger_entries(entity_id, occurred_at, created_at, sequence);
CREATE INDEX idx_ledger_entries_occurred_at ON ledger_entries(occurred_at);
";

const DROP_SQL: &str = r"
DROP TABLE IF EXISTS ledger_entries;
DROP TABLE IF EXISTS document_lines;
DROP TABLE IF EXISTS source_documents;
DROP TABLE IF EXISTS ledger_entities;
DROP TYPE IF EXISTS document_status;
DROP TYPE IF EXISTS document_kind;
DROP TYPE IF EXISTS entry_kind;
DROP TYPE IF EXISTS entity_kind;
";
