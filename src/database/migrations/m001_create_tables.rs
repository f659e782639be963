use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(RobotGroups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RobotGroups::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(RobotGroups::Key)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(RobotGroups::Name).string().not_null())
                    .col(
                        ColumnDef::new(RobotGroups::ExpectedTotal)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RobotGroups::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RobotGroups::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RobotComponents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RobotComponents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RobotComponents::GroupId).integer().not_null())
                    .col(ColumnDef::new(RobotComponents::Label).string().not_null())
                    .col(
                        ColumnDef::new(RobotComponents::RiskLevel)
                            .string()
                            .not_null()
                            .default("normal"),
                    )
                    .col(ColumnDef::new(RobotComponents::RiskSource).string())
                    .col(ColumnDef::new(RobotComponents::LastEvaluatedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(RobotComponents::Metrics)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .col(ColumnDef::new(RobotComponents::Reference).string())
                    .col(ColumnDef::new(RobotComponents::Tech).string())
                    .col(
                        ColumnDef::new(RobotComponents::Mark)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RobotComponents::Remark)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(
                        ColumnDef::new(RobotComponents::ChartGeneration)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(RobotComponents::Archived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RobotComponents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RobotComponents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_robot_components_group_id")
                            .from(RobotComponents::Table, RobotComponents::GroupId)
                            .to(RobotGroups::Table, RobotGroups::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RiskEvents::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RiskEvents::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RiskEvents::ComponentId).integer().not_null())
                    .col(ColumnDef::new(RiskEvents::GroupId).integer().not_null())
                    .col(ColumnDef::new(RiskEvents::Kind).string().not_null())
                    .col(ColumnDef::new(RiskEvents::Severity).string().not_null())
                    .col(
                        ColumnDef::new(RiskEvents::Status)
                            .string()
                            .not_null()
                            .default("open"),
                    )
                    .col(
                        ColumnDef::new(RiskEvents::Score)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(RiskEvents::Message).text().not_null())
                    .col(
                        ColumnDef::new(RiskEvents::DetectedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RiskEvents::AcknowledgedBy).string())
                    .col(ColumnDef::new(RiskEvents::AcknowledgedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(RiskEvents::Notes)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(RiskEvents::ResolvedBy).string())
                    .col(ColumnDef::new(RiskEvents::ResolvedAt).timestamp_with_time_zone())
                    .col(ColumnDef::new(RiskEvents::ResolutionNote).text())
                    .col(
                        ColumnDef::new(RiskEvents::Archived)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RiskEvents::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RiskEvents::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_risk_events_component_id")
                            .from(RiskEvents::Table, RiskEvents::ComponentId)
                            .to(RobotComponents::Table, RobotComponents::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_risk_events_group_id")
                            .from(RiskEvents::Table, RiskEvents::GroupId)
                            .to(RobotGroups::Table, RobotGroups::Id)
                            .on_delete(ForeignKeyAction::Restrict),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(TrendCharts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrendCharts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(TrendCharts::ComponentId).integer().not_null())
                    .col(ColumnDef::new(TrendCharts::Axis).integer().not_null())
                    .col(
                        ColumnDef::new(TrendCharts::GeneratedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TrendCharts::ContentType).string().not_null())
                    .col(ColumnDef::new(TrendCharts::Payload).text().not_null())
                    .col(
                        ColumnDef::new(TrendCharts::PointCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_trend_charts_component_id")
                            .from(TrendCharts::Table, TrendCharts::ComponentId)
                            .to(RobotComponents::Table, RobotComponents::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(HighRiskHistories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(HighRiskHistories::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(HighRiskHistories::ComponentId).integer().not_null())
                    .col(ColumnDef::new(HighRiskHistories::GroupId).integer().not_null())
                    .col(ColumnDef::new(HighRiskHistories::Label).string().not_null())
                    .col(ColumnDef::new(HighRiskHistories::PreviousLevel).string().not_null())
                    .col(
                        ColumnDef::new(HighRiskHistories::EnteredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(HighRiskHistories::Source).string().not_null())
                    .col(ColumnDef::new(HighRiskHistories::SourceRef).string())
                    .col(ColumnDef::new(HighRiskHistories::Actor).string())
                    .col(
                        ColumnDef::new(HighRiskHistories::Metrics)
                            .text()
                            .not_null()
                            .default("{}"),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_robot_components_group_label")
                    .table(RobotComponents::Table)
                    .col(RobotComponents::GroupId)
                    .col(RobotComponents::Label)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_risk_events_component_status")
                    .table(RiskEvents::Table)
                    .col(RiskEvents::ComponentId)
                    .col(RiskEvents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_risk_events_detected_at")
                    .table(RiskEvents::Table)
                    .col(RiskEvents::DetectedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_trend_charts_component_axis")
                    .table(TrendCharts::Table)
                    .col(TrendCharts::ComponentId)
                    .col(TrendCharts::Axis)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_high_risk_histories_component_id")
                    .table(HighRiskHistories::Table)
                    .col(HighRiskHistories::ComponentId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(HighRiskHistories::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(TrendCharts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RiskEvents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RobotComponents::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RobotGroups::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(Iden)]
enum RobotGroups {
    Table,
    Id,
    Key,
    Name,
    ExpectedTotal,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RobotComponents {
    Table,
    Id,
    GroupId,
    Label,
    RiskLevel,
    RiskSource,
    LastEvaluatedAt,
    Metrics,
    Reference,
    Tech,
    Mark,
    Remark,
    ChartGeneration,
    Archived,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RiskEvents {
    Table,
    Id,
    ComponentId,
    GroupId,
    Kind,
    Severity,
    Status,
    Score,
    Message,
    DetectedAt,
    AcknowledgedBy,
    AcknowledgedAt,
    Notes,
    ResolvedBy,
    ResolvedAt,
    ResolutionNote,
    Archived,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum TrendCharts {
    Table,
    Id,
    ComponentId,
    Axis,
    GeneratedAt,
    ContentType,
    Payload,
    PointCount,
}

#[derive(Iden)]
enum HighRiskHistories {
    Table,
    Id,
    ComponentId,
    GroupId,
    Label,
    PreviousLevel,
    EnteredAt,
    Source,
    SourceRef,
    Actor,
    Metrics,
}
