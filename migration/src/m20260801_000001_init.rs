use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ========== SOURCES ==========
        manager
            .create_table(
                Table::create()
                    .table(Sources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sources::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Sources::Name).string_len(100).not_null().unique_key())
                    .col(ColumnDef::new(Sources::Url).string_len(200).not_null())
                    .col(ColumnDef::new(Sources::AuthToken).string_len(200))
                    .col(
                        ColumnDef::new(Sources::VerifyTls)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(Sources::TimeoutSecs).integer())
                    .col(ColumnDef::new(Sources::NetworkId).string_len(100))
                    .col(
                        ColumnDef::new(Sources::Status)
                            .string_len(50)
                            .not_null()
                            .default("new"),
                    )
                    .col(ColumnDef::new(Sources::LastSynced).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Sources::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== SNAPSHOTS ==========
        manager
            .create_table(
                Table::create()
                    .table(Snapshots::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Snapshots::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Snapshots::SourceId).uuid().not_null())
                    .col(ColumnDef::new(Snapshots::SnapshotId).string_len(100).not_null())
                    .col(ColumnDef::new(Snapshots::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Snapshots::Data).json_binary())
                    .col(ColumnDef::new(Snapshots::Date).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Snapshots::Status)
                            .string_len(50)
                            .not_null()
                            .default("unloaded"),
                    )
                    .col(
                        ColumnDef::new(Snapshots::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(Snapshots::UpdatedAt).timestamp_with_time_zone())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_snapshots_source")
                            .from(Snapshots::Table, Snapshots::SourceId)
                            .to(Sources::Table, Sources::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("snapshots_source_snapshot_idx")
                    .table(Snapshots::Table)
                    .col(Snapshots::SourceId)
                    .col(Snapshots::SnapshotId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ========== SYNCS ==========
        manager
            .create_table(
                Table::create()
                    .table(Syncs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Syncs::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Syncs::Name).string_len(100).not_null().unique_key())
                    .col(ColumnDef::new(Syncs::SnapshotId).uuid().not_null())
                    .col(
                        ColumnDef::new(Syncs::Parameters)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '{}'::jsonb"),
                    )
                    .col(
                        ColumnDef::new(Syncs::AutoMerge)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Syncs::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .col(ColumnDef::new(Syncs::Scheduled).timestamp_with_time_zone())
                    .col(ColumnDef::new(Syncs::IntervalMinutes).integer())
                    .col(ColumnDef::new(Syncs::User).string_len(150))
                    .col(
                        ColumnDef::new(Syncs::Status)
                            .string_len(50)
                            .not_null()
                            .default("new"),
                    )
                    .col(ColumnDef::new(Syncs::LastSynced).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Syncs::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_syncs_snapshot")
                            .from(Syncs::Table, Syncs::SnapshotId)
                            .to(Snapshots::Table, Snapshots::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== BRANCHES ==========
        manager
            .create_table(
                Table::create()
                    .table(Branches::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Branches::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Branches::Name).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Branches::SchemaName)
                            .string_len(63)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Branches::Status)
                            .string_len(50)
                            .not_null()
                            .default("new"),
                    )
                    .col(ColumnDef::new(Branches::User).string_len(150))
                    .col(
                        ColumnDef::new(Branches::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== JOBS ==========
        manager
            .create_table(
                Table::create()
                    .table(Jobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Jobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Jobs::Kind).string_len(50).not_null())
                    .col(ColumnDef::new(Jobs::ObjectId).uuid().not_null())
                    .col(ColumnDef::new(Jobs::Name).string_len(200).not_null())
                    .col(ColumnDef::new(Jobs::User).string_len(150))
                    .col(
                        ColumnDef::new(Jobs::Status)
                            .string_len(50)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Jobs::Scheduled).timestamp_with_time_zone())
                    .col(ColumnDef::new(Jobs::IntervalMinutes).integer())
                    .col(
                        ColumnDef::new(Jobs::Adhoc)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Jobs::Data).json_binary())
                    .col(ColumnDef::new(Jobs::Error).text())
                    .col(
                        ColumnDef::new(Jobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(Jobs::StartedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(Jobs::CompletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        // Worker claim scans: pending jobs by schedule time
        manager
            .create_index(
                Index::create()
                    .name("jobs_status_scheduled_idx")
                    .table(Jobs::Table)
                    .col(Jobs::Status)
                    .col(Jobs::Scheduled)
                    .to_owned(),
            )
            .await?;

        // ========== INGESTIONS ==========
        manager
            .create_table(
                Table::create()
                    .table(Ingestions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Ingestions::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Ingestions::SyncId).uuid().not_null())
                    .col(ColumnDef::new(Ingestions::JobId).uuid())
                    .col(ColumnDef::new(Ingestions::BranchId).uuid().unique_key())
                    .col(
                        ColumnDef::new(Ingestions::CreatedAt)
                            .timestamp_with_time_zone()
                            .extra("DEFAULT NOW()"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ingestions_sync")
                            .from(Ingestions::Table, Ingestions::SyncId)
                            .to(Syncs::Table, Syncs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ingestions_job")
                            .from(Ingestions::Table, Ingestions::JobId)
                            .to(Jobs::Table, Jobs::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ingestions_branch")
                            .from(Ingestions::Table, Ingestions::BranchId)
                            .to(Branches::Table, Branches::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== INGESTION ISSUES ==========
        manager
            .create_table(
                Table::create()
                    .table(IngestionIssues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IngestionIssues::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(IngestionIssues::IngestionId).uuid().not_null())
                    .col(
                        ColumnDef::new(IngestionIssues::Timestamp)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(IngestionIssues::Model).string_len(100))
                    .col(ColumnDef::new(IngestionIssues::Message).text().not_null())
                    .col(
                        ColumnDef::new(IngestionIssues::RawData)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '{}'::jsonb"),
                    )
                    .col(
                        ColumnDef::new(IngestionIssues::CoalesceFields)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '{}'::jsonb"),
                    )
                    .col(
                        ColumnDef::new(IngestionIssues::Defaults)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '{}'::jsonb"),
                    )
                    .col(ColumnDef::new(IngestionIssues::Exception).string_len(100).not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_ingestion_issues_ingestion")
                            .from(IngestionIssues::Table, IngestionIssues::IngestionId)
                            .to(Ingestions::Table, Ingestions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== TRANSFORM MAP GROUPS ==========
        manager
            .create_table(
                Table::create()
                    .table(TransformMapGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransformMapGroups::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(
                        ColumnDef::new(TransformMapGroups::Name)
                            .string_len(100)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(TransformMapGroups::Description).text())
                    .to_owned(),
            )
            .await?;

        // ========== TRANSFORM MAPS ==========
        manager
            .create_table(
                Table::create()
                    .table(TransformMaps::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransformMaps::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(TransformMaps::Name).string_len(100).not_null())
                    .col(
                        ColumnDef::new(TransformMaps::SourceModel)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransformMaps::TargetModel)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(ColumnDef::new(TransformMaps::GroupId).uuid())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transform_maps_group")
                            .from(TransformMaps::Table, TransformMaps::GroupId)
                            .to(TransformMapGroups::Table, TransformMapGroups::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One map per (group, target model); NULL groups share one slot
        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX transform_maps_group_target_idx ON transform_maps \
                 (target_model, COALESCE(group_id, '00000000-0000-0000-0000-000000000000'::uuid))",
            )
            .await?;

        // ========== TRANSFORM FIELDS ==========
        manager
            .create_table(
                Table::create()
                    .table(TransformFields::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TransformFields::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(TransformFields::MapId).uuid().not_null())
                    .col(
                        ColumnDef::new(TransformFields::SourceField)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransformFields::TargetField)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TransformFields::Coalesce)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(TransformFields::Template).text())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_transform_fields_map")
                            .from(TransformFields::Table, TransformFields::MapId)
                            .to(TransformMaps::Table, TransformMaps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== RELATIONSHIP FIELDS ==========
        manager
            .create_table(
                Table::create()
                    .table(RelationshipFields::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RelationshipFields::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(RelationshipFields::MapId).uuid().not_null())
                    .col(
                        ColumnDef::new(RelationshipFields::SourceKind)
                            .string_len(50)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RelationshipFields::TargetField)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RelationshipFields::Coalesce)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(RelationshipFields::Template).text().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_relationship_fields_map")
                            .from(RelationshipFields::Table, RelationshipFields::MapId)
                            .to(TransformMaps::Table, TransformMaps::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // ========== OBJECT CHANGES ==========
        // Copied empty into every branch schema; rows are written there and
        // replayed on merge.
        manager
            .create_table(
                Table::create()
                    .table(ObjectChanges::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ObjectChanges::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(
                        ColumnDef::new(ObjectChanges::Time)
                            .timestamp_with_time_zone()
                            .not_null()
                            .extra("DEFAULT NOW()"),
                    )
                    .col(ColumnDef::new(ObjectChanges::User).string_len(150))
                    .col(ColumnDef::new(ObjectChanges::Action).string_len(50).not_null())
                    .col(
                        ColumnDef::new(ObjectChanges::ObjectType)
                            .string_len(100)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ObjectChanges::ObjectId).uuid().not_null())
                    .col(ColumnDef::new(ObjectChanges::Prechange).json_binary())
                    .col(ColumnDef::new(ObjectChanges::Postchange).json_binary())
                    .to_owned(),
            )
            .await?;

        // ========== MANUFACTURERS ==========
        manager
            .create_table(
                Table::create()
                    .table(Manufacturers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Manufacturers::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Manufacturers::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Manufacturers::Slug).string_len(100).not_null())
                    .col(ColumnDef::new(Manufacturers::Description).string_len(200))
                    .col(
                        ColumnDef::new(Manufacturers::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX manufacturers_slug_lower_idx ON manufacturers (LOWER(slug))",
            )
            .await?;

        // ========== DEVICE ROLES ==========
        manager
            .create_table(
                Table::create()
                    .table(DeviceRoles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceRoles::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(DeviceRoles::Name).string_len(100).not_null())
                    .col(ColumnDef::new(DeviceRoles::Slug).string_len(100).not_null())
                    .col(ColumnDef::new(DeviceRoles::Color).string_len(6))
                    .col(ColumnDef::new(DeviceRoles::Description).string_len(200))
                    .col(
                        ColumnDef::new(DeviceRoles::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX device_roles_slug_lower_idx ON device_roles (LOWER(slug))",
            )
            .await?;

        // ========== DEVICE TYPES ==========
        manager
            .create_table(
                Table::create()
                    .table(DeviceTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceTypes::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(DeviceTypes::ManufacturerId).uuid().not_null())
                    .col(ColumnDef::new(DeviceTypes::Model).string_len(100).not_null())
                    .col(ColumnDef::new(DeviceTypes::Slug).string_len(100).not_null())
                    .col(ColumnDef::new(DeviceTypes::PartNumber).string_len(50))
                    .col(ColumnDef::new(DeviceTypes::UHeight).integer())
                    .col(ColumnDef::new(DeviceTypes::IsFullDepth).boolean())
                    .col(ColumnDef::new(DeviceTypes::Comments).text())
                    .col(
                        ColumnDef::new(DeviceTypes::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_device_types_manufacturer")
                            .from(DeviceTypes::Table, DeviceTypes::ManufacturerId)
                            .to(Manufacturers::Table, Manufacturers::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX device_types_manufacturer_slug_lower_idx \
                 ON device_types (manufacturer_id, LOWER(slug))",
            )
            .await?;

        // ========== SITES ==========
        manager
            .create_table(
                Table::create()
                    .table(Sites::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sites::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Sites::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Sites::Slug).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Sites::Status)
                            .string_len(50)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Sites::Description).string_len(200))
                    .col(
                        ColumnDef::new(Sites::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared("CREATE UNIQUE INDEX sites_slug_lower_idx ON sites (LOWER(slug))")
            .await?;

        // ========== LOCATIONS ==========
        manager
            .create_table(
                Table::create()
                    .table(Locations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Locations::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Locations::SiteId).uuid().not_null())
                    .col(ColumnDef::new(Locations::ParentId).uuid())
                    .col(ColumnDef::new(Locations::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Locations::Slug).string_len(100).not_null())
                    .col(
                        ColumnDef::new(Locations::Status)
                            .string_len(50)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Locations::Description).string_len(200))
                    .col(
                        ColumnDef::new(Locations::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_locations_site")
                            .from(Locations::Table, Locations::SiteId)
                            .to(Sites::Table, Sites::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_locations_parent")
                            .from(Locations::Table, Locations::ParentId)
                            .to(Locations::Table, Locations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX locations_site_slug_lower_idx \
                 ON locations (site_id, LOWER(slug))",
            )
            .await?;

        // ========== DEVICES ==========
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Devices::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Devices::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Devices::DeviceTypeId).uuid().not_null())
                    .col(ColumnDef::new(Devices::RoleId).uuid().not_null())
                    .col(ColumnDef::new(Devices::SiteId).uuid())
                    .col(ColumnDef::new(Devices::LocationId).uuid())
                    .col(
                        ColumnDef::new(Devices::Status)
                            .string_len(50)
                            .not_null()
                            .default("active"),
                    )
                    .col(ColumnDef::new(Devices::Serial).string_len(50))
                    .col(ColumnDef::new(Devices::AssetTag).string_len(50))
                    .col(ColumnDef::new(Devices::Comments).text())
                    .col(
                        ColumnDef::new(Devices::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_devices_device_type")
                            .from(Devices::Table, Devices::DeviceTypeId)
                            .to(DeviceTypes::Table, DeviceTypes::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_devices_role")
                            .from(Devices::Table, Devices::RoleId)
                            .to(DeviceRoles::Table, DeviceRoles::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_devices_site")
                            .from(Devices::Table, Devices::SiteId)
                            .to(Sites::Table, Sites::Id),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_devices_location")
                            .from(Devices::Table, Devices::LocationId)
                            .to(Locations::Table, Locations::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX devices_name_lower_idx ON devices (LOWER(name))",
            )
            .await?;

        // ========== INTERFACES ==========
        manager
            .create_table(
                Table::create()
                    .table(Interfaces::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Interfaces::Id)
                            .uuid()
                            .not_null()
                            .primary_key()
                            .extra("DEFAULT gen_random_uuid()"),
                    )
                    .col(ColumnDef::new(Interfaces::DeviceId).uuid().not_null())
                    .col(ColumnDef::new(Interfaces::Name).string_len(100).not_null())
                    .col(ColumnDef::new(Interfaces::IfType).string_len(50))
                    .col(ColumnDef::new(Interfaces::Enabled).boolean())
                    .col(ColumnDef::new(Interfaces::Mtu).integer())
                    .col(ColumnDef::new(Interfaces::MacAddress).string_len(17))
                    .col(ColumnDef::new(Interfaces::SpeedKbps).big_integer())
                    .col(ColumnDef::new(Interfaces::Description).string_len(200))
                    .col(
                        ColumnDef::new(Interfaces::Tags)
                            .json_binary()
                            .not_null()
                            .extra("DEFAULT '[]'::jsonb"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_interfaces_device")
                            .from(Interfaces::Table, Interfaces::DeviceId)
                            .to(Devices::Table, Devices::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .get_connection()
            .execute_unprepared(
                "CREATE UNIQUE INDEX interfaces_device_name_idx ON interfaces (device_id, name)",
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        for table in [
            "interfaces",
            "devices",
            "locations",
            "sites",
            "device_types",
            "device_roles",
            "manufacturers",
            "object_changes",
            "relationship_fields",
            "transform_fields",
            "transform_maps",
            "transform_map_groups",
            "ingestion_issues",
            "ingestions",
            "jobs",
            "branches",
            "syncs",
            "snapshots",
            "sources",
        ] {
            manager
                .get_connection()
                .execute_unprepared(&format!("DROP TABLE IF EXISTS \"{table}\" CASCADE"))
                .await?;
        }
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Sources {
    Table,
    Id,
    Name,
    Url,
    AuthToken,
    VerifyTls,
    TimeoutSecs,
    NetworkId,
    Status,
    LastSynced,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Snapshots {
    Table,
    Id,
    SourceId,
    SnapshotId,
    Name,
    Data,
    Date,
    Status,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Syncs {
    Table,
    Id,
    Name,
    SnapshotId,
    Parameters,
    AutoMerge,
    Tags,
    Scheduled,
    IntervalMinutes,
    User,
    Status,
    LastSynced,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Branches {
    Table,
    Id,
    Name,
    SchemaName,
    Status,
    User,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Jobs {
    Table,
    Id,
    Kind,
    ObjectId,
    Name,
    User,
    Status,
    Scheduled,
    IntervalMinutes,
    Adhoc,
    Data,
    Error,
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Ingestions {
    Table,
    Id,
    SyncId,
    JobId,
    BranchId,
    CreatedAt,
}

#[derive(DeriveIden)]
enum IngestionIssues {
    Table,
    Id,
    IngestionId,
    Timestamp,
    Model,
    Message,
    RawData,
    CoalesceFields,
    Defaults,
    Exception,
}

#[derive(DeriveIden)]
enum TransformMapGroups {
    Table,
    Id,
    Name,
    Description,
}

#[derive(DeriveIden)]
enum TransformMaps {
    Table,
    Id,
    Name,
    SourceModel,
    TargetModel,
    GroupId,
}

#[derive(DeriveIden)]
enum TransformFields {
    Table,
    Id,
    MapId,
    SourceField,
    TargetField,
    Coalesce,
    Template,
}

#[derive(DeriveIden)]
enum RelationshipFields {
    Table,
    Id,
    MapId,
    SourceKind,
    TargetField,
    Coalesce,
    Template,
}

#[derive(DeriveIden)]
enum ObjectChanges {
    Table,
    Id,
    Time,
    User,
    Action,
    ObjectType,
    ObjectId,
    Prechange,
    Postchange,
}

#[derive(DeriveIden)]
enum Manufacturers {
    Table,
    Id,
    Name,
    Slug,
    Description,
    Tags,
}

#[derive(DeriveIden)]
enum DeviceRoles {
    Table,
    Id,
    Name,
    Slug,
    Color,
    Description,
    Tags,
}

#[derive(DeriveIden)]
enum DeviceTypes {
    Table,
    Id,
    ManufacturerId,
    Model,
    Slug,
    PartNumber,
    UHeight,
    IsFullDepth,
    Comments,
    Tags,
}

#[derive(DeriveIden)]
enum Sites {
    Table,
    Id,
    Name,
    Slug,
    Status,
    Description,
    Tags,
}

#[derive(DeriveIden)]
enum Locations {
    Table,
    Id,
    SiteId,
    ParentId,
    Name,
    Slug,
    Status,
    Description,
    Tags,
}

#[derive(DeriveIden)]
enum Devices {
    Table,
    Id,
    Name,
    DeviceTypeId,
    RoleId,
    SiteId,
    LocationId,
    Status,
    Serial,
    AssetTag,
    Comments,
    Tags,
}

#[derive(DeriveIden)]
enum Interfaces {
    Table,
    Id,
    DeviceId,
    Name,
    IfType,
    Enabled,
    Mtu,
    MacAddress,
    SpeedKbps,
    Description,
    Tags,
}
