//! Canonical field names, following the PLACE (CODICE) hierarchy flattened with dots.

pub const LINK: &str = "link";
pub const TITLE: &str = "title";
pub const UPDATED: &str = "updated";
pub const SOURCE: &str = "source";
pub const ERROR: &str = "error";

pub const CONTRACT_FOLDER_ID: &str = "ContractFolderStatus.ContractFolderID";

pub const PARTY_ID: &str =
    "ContractFolderStatus.LocatedContractingParty.Party.PartyIdentification.ID";
pub const PARTY_NAME: &str = "ContractFolderStatus.LocatedContractingParty.Party.PartyName.Name";
pub const PARENT_PARTY_NAME: &str =
    "ContractFolderStatus.LocatedContractingParty.ParentLocatedParty.PartyName.Name";

pub const PROJECT_NAME: &str = "ContractFolderStatus.ProcurementProject.Name";
pub const TYPE_CODE: &str = "ContractFolderStatus.ProcurementProject.TypeCode";
pub const CPV_CODE: &str =
    "ContractFolderStatus.ProcurementProject.RequiredCommodityClassification.ItemClassificationCode";
pub const BUDGET_TOTAL: &str = "ContractFolderStatus.ProcurementProject.BudgetAmount.TotalAmount";
pub const BUDGET_TAX_EXCLUSIVE: &str =
    "ContractFolderStatus.ProcurementProject.BudgetAmount.TaxExclusiveAmount";
pub const BUDGET_ESTIMATED: &str =
    "ContractFolderStatus.ProcurementProject.BudgetAmount.EstimatedOverallContractAmount";
pub const DURATION: &str = "ContractFolderStatus.ProcurementProject.PlannedPeriod.DurationMeasure";
pub const OPTIONS_DESCRIPTION: &str =
    "ContractFolderStatus.ProcurementProject.ContractExtension.OptionsDescription";
pub const CITY_NAME: &str =
    "ContractFolderStatus.ProcurementProject.RealizedLocation.Address.CityName";
pub const POSTAL_ZONE: &str =
    "ContractFolderStatus.ProcurementProject.RealizedLocation.Address.PostalZone";
pub const COUNTRY_NAME: &str =
    "ContractFolderStatus.ProcurementProject.RealizedLocation.Address.Country.Name";
pub const COUNTRY_SUBENTITY: &str =
    "ContractFolderStatus.ProcurementProject.RealizedLocation.CountrySubentity";
pub const COUNTRY_SUBENTITY_CODE: &str =
    "ContractFolderStatus.ProcurementProject.RealizedLocation.CountrySubentityCode";

pub const LOT_ID: &str = "ContractFolderStatus.ProcurementProjectLot.ID";
pub const LOT_NAME: &str = "ContractFolderStatus.ProcurementProjectLot.ProcurementProject.Name";
pub const LOT_BUDGET_TAX_EXCLUSIVE: &str =
    "ContractFolderStatus.ProcurementProjectLot.ProcurementProject.BudgetAmount.TaxExclusiveAmount";
pub const LOT_CPV_CODE: &str = "ContractFolderStatus.ProcurementProjectLot.ProcurementProject.RequiredCommodityClassification.ItemClassificationCode";

pub const STATUS_CODE: &str = "ContractFolderStatus.TenderResult.StatusCode";
pub const RESULT_CODE: &str = "ContractFolderStatus.TenderResult.ResultCode";
pub const AWARD_DATE: &str = "ContractFolderStatus.TenderResult.AwardDate";
pub const CONTRACT_ISSUE_DATE: &str = "ContractFolderStatus.TenderResult.Contract.IssueDate";
pub const RECEIVED_TENDER_QUANTITY: &str = "ContractFolderStatus.TenderResult.ReceivedTenderQuantity";
pub const WINNER_ID: &str = "ContractFolderStatus.TenderResult.WinningParty.PartyIdentification.ID";
pub const WINNER_ID_SCHEME: &str =
    "ContractFolderStatus.TenderResult.WinningParty.PartyIdentification.IDschemeName";
pub const WINNER_NAME: &str = "ContractFolderStatus.TenderResult.WinningParty.PartyName.Name";
pub const SME_AWARDED: &str = "ContractFolderStatus.TenderResult.SMEAwardedIndicator";
pub const AWARDED_LOT_ID: &str =
    "ContractFolderStatus.TenderResult.AwardedTenderedProject.ProcurementProjectLotID";
pub const AWARDED_TAX_EXCLUSIVE: &str =
    "ContractFolderStatus.TenderResult.AwardedTenderedProject.LegalMonetaryTotal.TaxExclusiveAmount";
pub const AWARDED_PAYABLE: &str =
    "ContractFolderStatus.TenderResult.AwardedTenderedProject.LegalMonetaryTotal.PayableAmount";

pub const PROCEDURE_CODE: &str = "ContractFolderStatus.TenderingProcess.ProcedureCode";
pub const URGENCY_CODE: &str = "ContractFolderStatus.TenderingProcess.UrgencyCode";
pub const SUBMISSION_DEADLINE: &str =
    "ContractFolderStatus.TenderingProcess.TenderSubmissionDeadlinePeriod.EndDate";
pub const FUNDING_PROGRAM_CODE: &str = "ContractFolderStatus.TenderingTerms.FundingProgramCode";

pub const NOTICE_ISSUE_DATE: &str = "ContractFolderStatus.ValidNoticeInfo.AdditionalPublicationStatus.AdditionalPublicationDocumentReference.IssueDate";

pub const LEGAL_DOCUMENT_ID: &str = "ContractFolderStatus.LegalDocumentReference.ID";
pub const LEGAL_DOCUMENT_URI: &str =
    "ContractFolderStatus.LegalDocumentReference.Attachment.ExternalReference.URI";
pub const TECHNICAL_DOCUMENT_ID: &str = "ContractFolderStatus.TechnicalDocumentReference.ID";
pub const TECHNICAL_DOCUMENT_URI: &str =
    "ContractFolderStatus.TechnicalDocumentReference.Attachment.ExternalReference.URI";

pub const AWARDING_CRITERIA_TYPE: &str =
    "ContractFolderStatus.TenderingTerms.AwardingTerms.AwardingCriteria.AwardingCriteriaTypeCode";
pub const AWARDING_CRITERIA_DESCRIPTION: &str =
    "ContractFolderStatus.TenderingTerms.AwardingTerms.AwardingCriteria.Description";
pub const AWARDING_CRITERIA_WEIGHT: &str =
    "ContractFolderStatus.TenderingTerms.AwardingTerms.AwardingCriteria.WeightNumeric";

pub const FINANCIAL_CRITERIA_TYPE: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.TendererQualificationRequest.FinancialEvaluationCriteria.EvaluationCriteriaTypeCode";
pub const FINANCIAL_CRITERIA_DESCRIPTION: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.TendererQualificationRequest.FinancialEvaluationCriteria.Description";
pub const FINANCIAL_CRITERIA_THRESHOLD: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.TendererQualificationRequest.FinancialEvaluationCriteria.ThresholdQuantity";

pub const TECHNICAL_CRITERIA_TYPE: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.TendererQualificationRequest.TechnicalEvaluationCriteria.EvaluationCriteriaTypeCode";
pub const TECHNICAL_CRITERIA_DESCRIPTION: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.TendererQualificationRequest.TechnicalEvaluationCriteria.Description";
pub const TECHNICAL_CRITERIA_THRESHOLD: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.TendererQualificationRequest.TechnicalEvaluationCriteria.ThresholdQuantity";

pub const EXECUTION_REQUIREMENT_CODE: &str =
    "ContractFolderStatus.TenderingTerms.ContractExecutionRequirement.ExecutionRequirementCode";
pub const EXECUTION_REQUIREMENT_NAME: &str =
    "ContractFolderStatus.TenderingTerms.ContractExecutionRequirement.Name";
pub const EXECUTION_REQUIREMENT_DESCRIPTION: &str =
    "ContractFolderStatus.TenderingTerms.ContractExecutionRequirement.Description";

pub const LOT_AWARDING_CRITERIA_TYPE: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.AwardingTerms.AwardingCriteria.AwardingCriteriaTypeCode";
pub const LOT_AWARDING_CRITERIA_SUBTYPE: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.AwardingTerms.AwardingCriteria.AwardingCriteriaSubTypeCode";
pub const LOT_AWARDING_CRITERIA_DESCRIPTION: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.AwardingTerms.AwardingCriteria.Description";
pub const LOT_AWARDING_CRITERIA_WEIGHT: &str = "ContractFolderStatus.ProcurementProjectLot.TenderingTerms.AwardingTerms.AwardingCriteria.WeightNumeric";

/// Catalonia rows carry a pointer to their tender publication document.
pub const TENDER_DOCUMENT_POINTER: &str = "url_json_licitacio";
